// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use podplay::config::DEFAULT_FEED_URL;
use podplay::playback::RodioOutput;
use podplay::{
    AppController, ClickDebouncer, ClickKind, EpisodeRecord, FeedError, PlayOutcome, PlaybackState,
    PlayerConfig, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter,
    Snapshot, TracingReporter, format_clock,
};

// Emoji with fallback for terminals without Unicode support
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PLAY: Emoji<'_, '_> = Emoji("▶️  ", "> ");
static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "|| ");
static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[] ");

/// Browse a podcast feed and play its episodes
#[derive(Parser, Debug)]
#[command(name = "podplay")]
#[command(about = "Browse a podcast feed and play its episodes")]
#[command(version)]
struct Args {
    /// RSS feed URL
    #[arg(default_value = DEFAULT_FEED_URL)]
    feed: String,

    /// Directory downloaded episodes are written to
    #[arg(short, long, default_value = "downloads")]
    downloads_dir: PathBuf,

    /// Maximum number of episodes to list
    #[arg(short, long, default_value = "20")]
    limit: usize,

    /// Screen refreshes per second
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Window in milliseconds in which a repeated selection shows details
    #[arg(long, default_value = "500")]
    double_click_ms: u64,

    /// Quiet mode - suppress the progress bar
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn to_config(&self) -> PlayerConfig {
        PlayerConfig {
            feed_url: self.feed.clone(),
            limit: self.limit,
            downloads_dir: self.downloads_dir.clone(),
            frame_interval: Duration::from_secs(1) / self.fps,
            double_click_threshold: Duration::from_millis(self.double_click_ms),
        }
    }
}

/// A line typed by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Select(usize),
    TogglePause,
    Stop,
    Refresh,
    List,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Ok(index) = line.parse::<usize>() {
            return Some(Command::Select(index));
        }
        match line {
            "p" => Some(Command::TogglePause),
            "s" => Some(Command::Stop),
            "r" => Some(Command::Refresh),
            "l" => Some(Command::List),
            "h" | "?" => Some(Command::Help),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Prints finished and failed transfers above the progress bars
struct ConsoleReporter {
    multi: MultiProgress,
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: ProgressEvent) {
        let line = match event {
            ProgressEvent::TransferCompleted {
                episode_title,
                bytes_downloaded,
                ..
            } => format!(
                "{SUCCESS}{} ({:.1} MB)",
                truncate_title(&episode_title, 50).green(),
                bytes_downloaded as f64 / (1024.0 * 1024.0)
            ),
            ProgressEvent::TransferFailed {
                episode_title,
                error,
                ..
            } => format!(
                "{FAILURE}{} - {}",
                truncate_title(&episode_title, 40).red(),
                error.red()
            ),
            ProgressEvent::TransferDiscarded { episode_title, .. } => {
                format!("Discarded outdated download of {}", truncate_title(&episode_title, 40))
                    .dimmed()
                    .to_string()
            }
            ProgressEvent::PartialFilesCleanedUp { count } => {
                format!("Removed {count} unfinished download(s)")
                    .dimmed()
                    .to_string()
            }
            ProgressEvent::TransferStarting { .. } | ProgressEvent::TransferProgress { .. } => {
                return;
            }
        };
        let _ = self.multi.println(line);
    }
}

/// The two status lines redrawn every frame
struct Screen {
    multi: MultiProgress,
    download: ProgressBar,
    player: ProgressBar,
}

impl Screen {
    fn new(multi: MultiProgress, quiet: bool) -> Result<Self> {
        let player = multi.add(ProgressBar::new_spinner());
        player.set_style(ProgressStyle::default_spinner().template("{wide_msg}")?);

        let download = if quiet {
            ProgressBar::hidden()
        } else {
            multi.add(ProgressBar::new(100))
        };
        download.set_style(
            ProgressStyle::default_bar()
                .template(&format!("{DOWNLOAD}[{{bar:30.cyan/blue}}] {{pos:>3}}% {{wide_msg}}"))?
                .progress_chars("█▓░"),
        );

        Ok(Self {
            multi,
            download,
            player,
        })
    }

    fn println(&self, line: impl AsRef<str>) {
        let _ = self.multi.println(line);
    }

    fn render(&self, snapshot: &Snapshot) {
        let player = &snapshot.player;
        let line = match (&player.now_playing, player.state) {
            (Some(now), PlaybackState::Playing | PlaybackState::Paused) => {
                let icon = if player.state == PlaybackState::Playing {
                    PLAY
                } else {
                    PAUSE
                };
                let total = now
                    .episode
                    .duration_secs
                    .map(|d| format!(" / {}", format_clock(d)))
                    .unwrap_or_default();
                format!(
                    "{icon}{} {}{}",
                    truncate_title(&now.episode.title, 50).bold(),
                    format_clock(player.position_secs as u64).cyan(),
                    total.dimmed()
                )
            }
            _ => format!("{STOP}{}", "Nothing playing".dimmed()),
        };
        self.player.set_message(line);

        let download = &snapshot.download;
        if download.active {
            let title = download
                .episode_title
                .as_deref()
                .map(|t| truncate_title(t, 40))
                .unwrap_or_default();
            self.download.set_position(download.progress as u64);
            self.download.set_message(title);
        } else {
            self.download.set_position(0);
            self.download.set_message("");
        }
    }
}

fn print_episodes(screen: &Screen, title: &str, episodes: &[EpisodeRecord]) {
    screen.println(format!("\n{HEADPHONES}{}", title.bold().green()));
    if episodes.is_empty() {
        screen.println("  (no episodes)".dimmed().to_string());
    }
    for episode in episodes {
        screen.println(format!(
            "  {:>3}  {}  {}",
            episode.index.to_string().cyan(),
            truncate_title(&episode.title, 60),
            episode.formatted_date().dimmed()
        ));
    }
    screen.println(
        "\n  <n> play  p pause/resume  s stop  r refresh  l list  q quit\n"
            .dimmed()
            .to_string(),
    );
}

fn print_details(screen: &Screen, episode: &EpisodeRecord) {
    screen.println(format!("\n{}", episode.title.bold()));
    screen.println(format!(
        "  {}  {}  {:.1} MB",
        episode.formatted_date(),
        episode.formatted_duration(),
        episode.size_mb()
    ));
    if !episode.description.is_empty() {
        screen.println(format!("  {}", truncate_title(&episode.description, 400).dimmed()));
    }
    screen.println("");
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Read stdin on a plain thread; the channel closes at end of input
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn report_outcome(screen: &Screen, outcome: PlayOutcome) {
    match outcome {
        PlayOutcome::DownloadFailed { index, error } => {
            screen.println(format!("{FAILURE}Episode {index}: {}", error.to_string().red()));
        }
        PlayOutcome::LoadFailed { index, error } => {
            screen.println(format!("{FAILURE}Episode {index}: {}", error.to_string().red()));
        }
        PlayOutcome::UnknownEpisode { index } => {
            screen.println(format!("No episode {index}").yellow().to_string());
        }
        other => debug!(?other, "play request finished"),
    }
}

/// Deliver a background task's result to the presentation loop
fn forward<T: Send + 'static>(task: JoinHandle<T>, tx: &mpsc::UnboundedSender<T>) {
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Ok(result) = task.await {
            let _ = tx.send(result);
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podplay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.to_config();
    let multi = MultiProgress::new();

    let reporter: SharedProgressReporter = if args.quiet {
        TracingReporter::shared()
    } else {
        Arc::new(ConsoleReporter {
            multi: multi.clone(),
        })
    };

    let output = RodioOutput::open_default().context("Failed to open audio output")?;
    let app = AppController::from_config(ReqwestClient::new(), &config, output, reporter)
        .context("Failed to set up player")?;
    let screen = Screen::new(multi, args.quiet)?;

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<PlayOutcome>();
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<Result<usize, FeedError>>();

    screen.println(format!("{SEARCH}Fetching feed: {}", config.feed_url.cyan()));
    forward(app.refresh(), &refresh_tx);

    let mut commands = spawn_stdin_reader();
    let mut debouncer = ClickDebouncer::new(config.double_click_threshold);
    let mut frames = tokio::time::interval(config.frame_interval);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                if app.tick() {
                    screen.println(format!("{STOP}{}", "Episode finished".dimmed()));
                }
                screen.render(&app.snapshot());
            }
            Some(outcome) = outcome_rx.recv() => report_outcome(&screen, outcome),
            Some(refreshed) = refresh_rx.recv() => match refreshed {
                Ok(_) => print_episodes(&screen, &app.podcast_title(), &app.episodes()),
                Err(e) => screen.println(format!(
                    "{FAILURE}{} (keeping current list)",
                    e.to_string().red()
                )),
            },
            line = commands.recv() => {
                let Some(line) = line else { break };
                let Some(command) = Command::parse(&line) else {
                    if !line.trim().is_empty() {
                        screen.println(format!("Unknown command: {}", line.trim()).yellow().to_string());
                    }
                    continue;
                };

                match command {
                    Command::Select(index) => match debouncer.register(index, Instant::now()) {
                        ClickKind::Single => forward(app.play_episode(index), &outcome_tx),
                        ClickKind::Double => match app.episode(index) {
                            Some(episode) => print_details(&screen, &episode),
                            None => screen.println(format!("No episode {index}").yellow().to_string()),
                        },
                    },
                    Command::TogglePause => {
                        app.toggle_play_pause();
                    }
                    Command::Stop => app.stop(),
                    Command::Refresh => {
                        screen.println(format!("{SEARCH}Refreshing feed"));
                        forward(app.refresh(), &refresh_tx);
                    }
                    Command::List => print_episodes(&screen, &app.podcast_title(), &app.episodes()),
                    Command::Help => screen.println(
                        "<n> play  p pause/resume  s stop  r refresh  l list  q quit"
                    ),
                    Command::Quit => break,
                }
            }
        }
    }

    app.stop();
    screen.player.finish_and_clear();
    screen.download.finish_and_clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(" 7 "), Some(Command::Select(7)));
        assert_eq!(Command::parse("p"), Some(Command::TogglePause));
        assert_eq!(Command::parse("s"), Some(Command::Stop));
        assert_eq!(Command::parse("r"), Some(Command::Refresh));
        assert_eq!(Command::parse("l"), Some(Command::List));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("-1"), None);
        assert_eq!(Command::parse("play"), None);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_title("short", 10), "short");
        assert_eq!(truncate_title("ünïcödé títle", 8), "ünïcö...");
    }

    #[test]
    fn config_from_args() {
        let args = Args::parse_from(["podplay", "https://example.com/feed", "--fps", "10"]);
        let config = args.to_config();

        assert_eq!(config.feed_url, "https://example.com/feed");
        assert_eq!(config.frame_interval, Duration::from_millis(100));
        assert_eq!(config.limit, 20);
    }

    #[test]
    fn fps_outside_range_is_rejected() {
        for fps in ["0", "241", "1000000000"] {
            let parsed = Args::try_parse_from(["podplay", "https://example.com/feed", "--fps", fps]);
            assert!(parsed.is_err(), "--fps {fps} accepted");
        }
        let args =
            Args::try_parse_from(["podplay", "https://example.com/feed", "--fps", "240"]).unwrap();
        assert_eq!(args.to_config().frame_interval, Duration::from_secs(1) / 240);
    }
}
