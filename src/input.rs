// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::{Duration, Instant};

/// How a selection should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Single,
    Double,
}

/// Classifies selections as single or double clicks
///
/// A selection is a double click when it hits the same target as the
/// previous one within `threshold`. A double click consumes the pair, so a
/// third quick selection starts over as a single click.
#[derive(Debug, Clone)]
pub struct ClickDebouncer<T> {
    threshold: Duration,
    last: Option<(Instant, T)>,
}

impl<T: PartialEq> ClickDebouncer<T> {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last: None,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn register(&mut self, target: T, now: Instant) -> ClickKind {
        let is_double = self.last.as_ref().is_some_and(|(at, previous)| {
            *previous == target && now.saturating_duration_since(*at) < self.threshold
        });

        if is_double {
            self.last = None;
            ClickKind::Double
        } else {
            self.last = Some((now, target));
            ClickKind::Single
        }
    }
}
