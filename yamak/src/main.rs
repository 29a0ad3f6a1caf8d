//! yamak - operator CLI for the Yamak analytics beacon
//!
//! This tool provides commands for:
//! - Checking the effective tracker configuration
//! - Sending a one-off custom event for the configured project
//! - Replaying a navigation sequence through a simulated page
//! - Testing path exclusion patterns
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/yamak/config.toml (~/.config/yamak/config.toml)
//! - Logs: $XDG_STATE_HOME/yamak/ (~/.local/state/yamak/)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;
use yamak_core::matcher::PathPattern;
use yamak_core::transport::RecordedSend;
use yamak_core::{
    App, Config, HttpTransport, MemoryTransport, Properties, SendCallback, SendOutcome,
    SimulatedHost, TrackOptions, TrackOutcome, TrackerOptions, Transport,
};

/// How long to wait for the collector before giving up on pending sends
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "yamak")]
#[command(about = "Yamak analytics beacon")]
#[command(version)]
struct Args {
    /// Write logs to the state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the effective configuration
    Status,

    /// Send a single custom event
    Track {
        /// Event name
        event: String,

        /// Property as key=value; JSON values are decoded, anything else is a string
        #[arg(short, long = "prop", value_parser = parse_prop)]
        props: Vec<(String, Value)>,

        /// Send at most once per session
        #[arg(long)]
        unique: bool,

        /// Project ID (default: from config)
        #[arg(long)]
        project: Option<String>,

        /// Page the event is sent from
        #[arg(long, default_value = "https://example.com/")]
        url: String,

        /// Print the payload instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay a navigation sequence through a simulated page, then unload it
    Replay {
        /// Paths visited, in order
        #[arg(long = "path", required = true)]
        paths: Vec<String>,

        /// Site origin the paths belong to
        #[arg(long, default_value = "https://example.com")]
        origin: String,

        /// Referrer of the first page
        #[arg(long)]
        referrer: Option<String>,

        /// Time spent on each page
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Viewport width in CSS pixels
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Project ID (default: from config)
        #[arg(long)]
        project: Option<String>,

        /// Print the payloads instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check which paths an exclusion pattern matches
    MatchPath {
        /// Pattern using `*` and `**` wildcards
        pattern: String,

        /// Paths to test
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn parse_prop(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty property name in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(yamak_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Track {
            event,
            props,
            unique,
            project,
            url,
            dry_run,
        } => cmd_track(&config, &event, props, unique, project, &url, dry_run).await,
        Command::Replay {
            paths,
            origin,
            referrer,
            interval_ms,
            width,
            project,
            dry_run,
        } => {
            let replay = Replay {
                paths,
                origin,
                referrer,
                interval: Duration::from_millis(interval_ms),
                width,
            };
            cmd_replay(&config, replay, project, dry_run).await
        }
        Command::MatchPath { pattern, paths } => cmd_match_path(&pattern, &paths),
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Yamak Configuration");
    println!("===================");
    println!();

    let config_path = Config::config_path();
    println!(
        "Config file:     {} ({})",
        config_path.display(),
        if config_path.exists() {
            "found"
        } else {
            "not found, using defaults"
        }
    );

    let tracker = &config.tracker;
    let options = &tracker.options;
    println!(
        "Project ID:      {}",
        tracker.project_id.as_deref().unwrap_or("<not set>")
    );
    println!("Endpoint:        {}", options.endpoint());
    println!("Page views:      {}", on_off(!options.disable_page_view_tracking));
    println!("Events:          {}", on_off(!options.disable_event_tracking));
    println!("Outbound links:  {}", on_off(options.track_outbound_links));
    println!("Track hash:      {}", on_off(options.track_hash));
    println!("Track search:    {}", on_off(options.track_search));
    println!("Ignore errors:   {}", options.ignore_errors);
    if options.exclude_paths.is_empty() {
        println!("Exclude paths:   <none>");
    } else {
        println!("Exclude paths:   {}", options.exclude_paths.join(", "));
    }
    println!("Timeout:         {}s", config.transport.timeout_secs);
    println!("Log file:        {}", yamak_core::logging::log_file_path().display());

    println!();
    if tracker.project_id.is_some() {
        println!("Status: Ready to send");
    } else {
        println!("Status: Not ready (set project_id under [tracker])");
    }

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

async fn cmd_track(
    config: &Config,
    event: &str,
    props: Vec<(String, Value)>,
    unique: bool,
    project: Option<String>,
    url: &str,
    dry_run: bool,
) -> Result<()> {
    let project_id = resolve_project(config, project)?;
    let host = Arc::new(SimulatedHost::new(url).context("invalid page URL")?);

    let options = TrackerOptions {
        disable_page_view_tracking: true,
        ..config.tracker.options.clone()
    };
    let sink = Sink::new(config, dry_run)?;
    let app = App::builder(project_id)
        .options(options)
        .host(host)
        .transport(sink.transport())
        .build()
        .context("failed to start tracking session")?;

    let mut track_options = TrackOptions::new();
    if unique {
        track_options = track_options.unique();
    }
    if !props.is_empty() {
        let bag = props
            .into_iter()
            .fold(Properties::new(), |bag, (key, value)| bag.insert(key, value));
        track_options = track_options.props(bag);
    }

    let outcome = app.track(event, track_options);
    app.stop();

    if outcome != TrackOutcome::Sent {
        println!("Event not sent: {outcome:?}");
        return Ok(());
    }

    sink.finish().await
}

/// A navigation sequence to replay
struct Replay {
    paths: Vec<String>,
    origin: String,
    referrer: Option<String>,
    interval: Duration,
    width: u32,
}

async fn cmd_replay(
    config: &Config,
    replay: Replay,
    project: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let project_id = resolve_project(config, project)?;
    let origin = replay.origin.trim_end_matches('/');

    let Some((first, rest)) = replay.paths.split_first() else {
        bail!("no paths to replay");
    };

    let mut host = SimulatedHost::new(&format!("{origin}{first}"))
        .context("invalid origin or path")?
        .with_inner_width(replay.width);
    if let Some(referrer) = &replay.referrer {
        host = host.with_referrer(referrer);
    }
    let host = Arc::new(host);

    let sink = Sink::new(config, dry_run)?;
    let app = App::builder(project_id)
        .options(config.tracker.options.clone())
        .host(host.clone())
        .transport(sink.transport())
        .build()
        .context("failed to start tracking session")?;

    for path in rest {
        tokio::time::sleep(replay.interval).await;
        host.set_location(path)
            .with_context(|| format!("invalid path {path:?}"))?;
        let outcome = app.check_page();
        tracing::info!(path = %path, outcome = ?outcome, "Replayed navigation");
    }

    tokio::time::sleep(replay.interval).await;
    host.unload();
    app.stop();

    sink.finish().await
}

fn resolve_project(config: &Config, project: Option<String>) -> Result<String> {
    match project.or_else(|| config.tracker.project_id.clone()) {
        Some(project_id) => Ok(project_id),
        None => bail!("no project ID: pass --project or set project_id under [tracker]"),
    }
}

fn cmd_match_path(pattern: &str, paths: &[String]) -> Result<()> {
    let pattern = PathPattern::compile(pattern).context("invalid pattern")?;

    for path in paths {
        let verdict = if pattern.matches(path) {
            "excluded"
        } else {
            "tracked"
        };
        println!("{verdict:<9} {path}");
    }

    Ok(())
}

// ============================================
// Delivery
// ============================================

/// Where the CLI's payloads go: printed (dry run) or posted and awaited
enum Sink {
    DryRun(Arc<MemoryTransport>),
    Collector {
        transport: Arc<AwaitedTransport>,
        done: mpsc::UnboundedReceiver<SendOutcome>,
    },
}

impl Sink {
    fn new(config: &Config, dry_run: bool) -> Result<Self> {
        if dry_run {
            return Ok(Sink::DryRun(Arc::new(MemoryTransport::new())));
        }

        let inner =
            HttpTransport::new(&config.transport).context("failed to create HTTP client")?;
        let (tx, done) = mpsc::unbounded_channel();
        Ok(Sink::Collector {
            transport: Arc::new(AwaitedTransport {
                inner,
                done: tx,
                queued: AtomicUsize::new(0),
            }),
            done,
        })
    }

    fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Sink::DryRun(transport) => Arc::clone(transport) as Arc<dyn Transport>,
            Sink::Collector { transport, .. } => Arc::clone(transport) as Arc<dyn Transport>,
        }
    }

    async fn finish(self) -> Result<()> {
        match self {
            Sink::DryRun(transport) => {
                for send in transport.take() {
                    print_send(&send)?;
                }
                Ok(())
            }
            Sink::Collector {
                transport,
                mut done,
            } => {
                let expected = transport.queued.load(Ordering::SeqCst);
                let mut delivered = 0;
                let mut failed = 0;

                let wait = async {
                    for _ in 0..expected {
                        match done.recv().await {
                            Some(outcome) if outcome.is_success() => delivered += 1,
                            Some(outcome) => {
                                failed += 1;
                                eprintln!("Delivery failed: {outcome:?}");
                            }
                            None => break,
                        }
                    }
                };
                if tokio::time::timeout(DELIVERY_TIMEOUT, wait).await.is_err() {
                    bail!("timed out waiting for the collector");
                }

                println!("Sent {delivered} event(s), {failed} failed");
                if failed > 0 {
                    bail!("{failed} event(s) were not accepted by the collector");
                }
                Ok(())
            }
        }
    }
}

fn print_send(send: &RecordedSend) -> Result<()> {
    println!("{:?} {} {}", send.mode, send.url, send.sent_at.to_rfc3339());
    println!(
        "{}",
        serde_json::to_string_pretty(&send.body).context("failed to render payload")?
    );
    Ok(())
}

/// Posts through [`HttpTransport`] and reports every completion, beacons
/// included, so the process can wait for them before exiting.
struct AwaitedTransport {
    inner: HttpTransport,
    done: mpsc::UnboundedSender<SendOutcome>,
    queued: AtomicUsize,
}

impl Transport for AwaitedTransport {
    fn send(&self, url: &str, body: String, on_complete: Option<SendCallback>) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let done = self.done.clone();
        let callback = SendCallback::new(move |outcome| {
            if let Some(on_complete) = &on_complete {
                on_complete.call(outcome.clone());
            }
            let _ = done.send(outcome);
        });
        self.inner.send(url, body, Some(callback));
    }

    fn send_beacon(&self, url: &str, body: String) -> bool {
        self.send(url, body, None);
        true
    }
}
