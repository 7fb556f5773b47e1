//! autodeck - autonomous DJ session runner
//!
//! Loads the session config and track catalog, connects to the DJ
//! application's MIDI port and runs one session. While it runs, these lines
//! are accepted on stdin:
//!
//! - `stop`: fade out and end at the next safe point
//! - `status`: print the session status as JSON
//! - `log`: print the event log as JSON

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use autodeck_core::config::{default_config_path, load_config, save_config, AutoDeckConfig};
use autodeck_core::decision::{DecisionService, HttpDecisionService};
use autodeck_core::device::LoggingChannel;
use autodeck_core::session::{SessionContext, SessionController};
use autodeck_core::{CommandChannel, InMemoryCatalog};
use autodeck_midi::{default_midi_map_path, list_output_ports, load_midi_map, MidiCommandChannel};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "autodeck")]
#[command(about = "Run an autonomous DJ session against a MIDI-controlled DJ application")]
#[command(version)]
struct Args {
    /// Genre to play (a key of the `genres` config section)
    #[arg(short, long, required_unless_present_any = ["list_ports", "write_default_config"])]
    genre: Option<String>,

    /// Session length in minutes
    #[arg(short, long, default_value_t = 60.0)]
    minutes: f64,

    /// Session config file (default: ~/.config/autodeck/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog file, overriding `catalog_path` from the config
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// MIDI mapping profile (default: ~/.config/autodeck/midi.yaml)
    #[arg(long)]
    midi_config: Option<PathBuf>,

    /// Log commands instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

enum ConsoleCommand {
    Stop,
    Status,
    Log,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG=debug to see every device command
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if args.list_ports {
        for port in list_output_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path("config.yaml"));
    if args.write_default_config {
        save_config(&AutoDeckConfig::default(), &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let mut config: AutoDeckConfig = load_config(&config_path);
    if let Some(catalog) = &args.catalog {
        config.catalog_path = catalog.clone();
    }
    config.validate().context("Invalid session configuration")?;

    let catalog = InMemoryCatalog::load(&config.catalog_path)
        .with_context(|| format!("Failed to load catalog {:?}", config.catalog_path))?;
    if catalog.is_empty() {
        bail!("Catalog {:?} has no tracks", config.catalog_path);
    }

    let channel: Arc<dyn CommandChannel> = if args.dry_run {
        log::info!("Dry run: device commands are only logged");
        Arc::new(LoggingChannel)
    } else {
        let map_path = args.midi_config.clone().unwrap_or_else(default_midi_map_path);
        let map = load_midi_map(&map_path);
        let midi = MidiCommandChannel::connect(map).context("Failed to open MIDI output")?;
        log::info!("Driving DJ application via MIDI port '{}'", midi.port_name());
        Arc::new(midi)
    };

    let decision: Option<Arc<dyn DecisionService>> = config.decision.endpoint.as_ref().map(|endpoint| {
        log::info!("Decision service at {}", endpoint);
        Arc::new(HttpDecisionService::new(
            endpoint.clone(),
            config.timing.decision_timeout(),
        )) as Arc<dyn DecisionService>
    });

    let mut controller = SessionController::new(SessionContext {
        config: Arc::new(config),
        catalog: Arc::new(catalog),
        channel,
        decision,
    });

    let genre = args.genre.unwrap_or_default();
    controller
        .start_session(&genre, args.minutes)
        .await
        .context("Session failed to start")?;
    println!("Session running: {} for {} min. Type 'stop', 'status' or 'log'.", genre, args.minutes);

    let mut console = spawn_console_reader();
    while controller.is_running() {
        tokio::select! {
            Some(command) = console.recv() => match command {
                ConsoleCommand::Stop => {
                    if let Err(e) = controller.stop_session() {
                        log::warn!("{}", e);
                    }
                }
                ConsoleCommand::Status => {
                    println!("{}", serde_json::to_string_pretty(&controller.status())?);
                }
                ConsoleCommand::Log => {
                    println!("{}", serde_json::to_string_pretty(&controller.event_log())?);
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }

    let report = controller.wait().await?;
    println!(
        "Session {}: {} tracks played in {:.1} min",
        report.final_phase,
        report.tracks_played,
        report.duration_secs / 60.0
    );
    Ok(())
}

/// Read console commands on a plain thread (stdin is blocking)
fn spawn_console_reader() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "stop" => ConsoleCommand::Stop,
                "status" => ConsoleCommand::Status,
                "log" => ConsoleCommand::Log,
                "" => continue,
                other => {
                    eprintln!("Unknown command '{}' (stop, status, log)", other);
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    rx
}
