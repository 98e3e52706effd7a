// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use parking_lot::Mutex;
use url::Url;

use crate::download::JobId;
use crate::feed::EpisodeRecord;

/// Supersede token: a strictly increasing play request number
pub type Ticket = u64;

/// How a new play request relates to the transfers already running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No transfer of this episode is running; the caller must start one
    Start(Ticket),
    /// A transfer of the same episode is running and now carries this
    /// request's ticket
    Joined { ticket: Ticket, job: Option<JobId> },
}

#[derive(Debug)]
struct InFlight {
    /// Ticket of the request that started the transfer
    owner: Ticket,
    source: Url,
    /// Newest request this transfer answers
    ticket: Ticket,
    job: Option<JobId>,
}

#[derive(Debug, Default)]
struct LedgerState {
    issued: Ticket,
    latest: Option<Ticket>,
    in_flight: HashMap<usize, InFlight>,
}

/// Decides which finished download may reach the player
///
/// Every play request gets a ticket and becomes the latest request. A
/// finished transfer may commit only while the newest ticket it answers is
/// still the latest one, and the check and the commit happen under one
/// lock. Transfers are keyed by episode index so that repeated requests
/// for an episode already downloading join the running transfer instead of
/// racing it for the same file.
#[derive(Debug, Default)]
pub struct RequestLedger {
    state: Mutex<LedgerState>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a play request for `episode`
    pub fn admit(&self, episode: &EpisodeRecord) -> Admission {
        let mut state = self.state.lock();
        state.issued += 1;
        let ticket = state.issued;
        state.latest = Some(ticket);

        if let Some(running) = state.in_flight.get_mut(&episode.index)
            && running.source == episode.source_url
        {
            running.ticket = ticket;
            return Admission::Joined {
                ticket,
                job: running.job,
            };
        }

        // A different episode at the same index (after a refresh) replaces
        // the entry; the older transfer then settles with its own ticket
        state.in_flight.insert(
            episode.index,
            InFlight {
                owner: ticket,
                source: episode.source_url.clone(),
                ticket,
                job: None,
            },
        );
        Admission::Start(ticket)
    }

    /// Record the download job serving the transfer started by `owner`
    pub fn attach_job(&self, index: usize, owner: Ticket, job: JobId) {
        let mut state = self.state.lock();
        if let Some(running) = state.in_flight.get_mut(&index)
            && running.owner == owner
        {
            running.job = Some(job);
        }
    }

    /// Finish the transfer started by `owner` and run `commit` if it still
    /// answers the latest request
    ///
    /// Returns `None` when the result is stale. `commit` runs with the
    /// ledger locked, so no newer request can be admitted in between.
    pub fn settle<R>(&self, index: usize, owner: Ticket, commit: impl FnOnce() -> R) -> Option<R> {
        let mut state = self.state.lock();
        let ticket = Self::take_entry(&mut state, index, owner).unwrap_or(owner);

        if state.latest == Some(ticket) {
            Some(commit())
        } else {
            None
        }
    }

    /// Forget the transfer started by `owner` without committing anything
    pub fn release(&self, index: usize, owner: Ticket) {
        let mut state = self.state.lock();
        Self::take_entry(&mut state, index, owner);
    }

    pub fn latest(&self) -> Option<Ticket> {
        self.state.lock().latest
    }

    pub fn is_in_flight(&self, index: usize) -> bool {
        self.state.lock().in_flight.contains_key(&index)
    }

    fn take_entry(state: &mut LedgerState, index: usize, owner: Ticket) -> Option<Ticket> {
        let owned = state
            .in_flight
            .get(&index)
            .is_some_and(|running| running.owner == owner);
        if owned {
            state.in_flight.remove(&index).map(|running| running.ticket)
        } else {
            None
        }
    }
}
