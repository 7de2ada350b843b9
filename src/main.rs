//! puck: input source switching daemon for macOS
//!
//! Runs as a LaunchAgent and provides:
//! - Global hotkey interception via CGEventTap
//! - Round-robin cycling through several input sources on one hotkey
//! - IPC server for status queries, reloads and event streaming
//!
//! The same binary is also the command line front end: listing input
//! sources, observing key names, checking the hotkey file and managing the
//! launchd service.

mod config;
mod daemon;
mod engine;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod switcher;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse, Config};
use crate::engine::HotkeyTable;
use crate::hotkey::{canonicalize, system_tap, EventMonitor, Hotkey, KeyHandler, RawKeyEvent};
use crate::ipc::{Client, Notification, Request, Response};
use crate::lifecycle::service::ServiceManager;
use crate::lifecycle::ShutdownSignal;
use crate::switcher::{switchable, system_directory, InputSourceDirectory};

#[derive(Parser, Debug)]
#[command(name = "puck", version, about = "Input source switching daemon for macOS")]
struct Args {
    /// Hotkey file (default: ~/.config/puck/puckrc)
    #[arg(short, long, env = "PUCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon in the foreground (default)
    Run {
        /// Append logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// List the input sources hotkeys can switch to
    List,

    /// Print the name of every key combination pressed
    Observe,

    /// Parse the hotkey file and print the resulting table
    Check,

    /// Show the running daemon's status
    Status,

    /// Make the running daemon re-read the hotkey file
    Reload,

    /// Make the running daemon forget cycle positions and debounce state
    Reset,

    /// Stream events from the running daemon
    Events,

    /// Manage the launchd service
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ServiceAction {
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run { log_file: None });

    let log_file = match &command {
        Command::Run { log_file } => log_file.as_deref(),
        _ => None,
    };
    init_tracing(&args.log_level, log_file)?;

    let config = Config::load(args.config)?;

    match command {
        Command::Run { .. } => daemon::run(config).await,
        Command::List => list_sources(),
        Command::Observe => observe().await,
        Command::Check => check(&config),
        Command::Status => status(&config).await,
        Command::Reload => reload(&config).await,
        Command::Reset => reset(&config).await,
        Command::Events => stream_events(&config).await,
        Command::Service { action } => service(&config, action),
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

fn list_sources() -> Result<()> {
    let directory = system_directory();
    let current = directory.current_id();
    let sources = switchable(directory.list()?);

    println!("Available input sources:");
    for source in sources {
        let marker = if current.as_deref() == Some(source.id.as_str()) { "*" } else { " " };
        println!("{marker} {} - \"{}\"", source.id, source.name);
    }

    Ok(())
}

/// Forwards every key-down to the printer and lets it through
struct Observer {
    keys: mpsc::UnboundedSender<Hotkey>,
}

impl KeyHandler for Observer {
    fn on_key_down(&mut self, event: RawKeyEvent) -> bool {
        let _ = self.keys.send(canonicalize(event.keycode, event.flags));
        false
    }
}

async fn observe() -> Result<()> {
    let mut shutdown = ShutdownSignal::new()?;
    let (keys_tx, mut keys_rx) = mpsc::unbounded_channel();
    let mut monitor = EventMonitor::new();
    monitor
        .start(system_tap(), Observer { keys: keys_tx })
        .context("failed to start key monitoring; check Accessibility permission")?;

    println!("Press keys to see their names. Press Ctrl+C to exit.");
    loop {
        tokio::select! {
            Some(hotkey) = keys_rx.recv() => println!("{hotkey}"),
            _ = shutdown.wait() => break,
        }
    }

    monitor.stop();
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let text = config.read_hotkeys()?;
    let parsed = parse(&text);
    let origin = config.hotkeys_path.display();

    for skipped in &parsed.skipped {
        println!("{origin}:{}: {}", skipped.line, skipped.error);
    }

    let malformed = parsed.skipped.len();
    let table = HotkeyTable::from_entries(parsed.bindings.into_iter().map(|b| (b.hotkey, b.target)));

    for (hotkey, group) in table.iter() {
        let targets: Vec<&str> = group.actions().iter().map(|a| a.target()).collect();
        if group.is_cycle() {
            println!("{hotkey} -> cycle [{}]", targets.join(", "));
        } else {
            println!("{hotkey} -> {}", targets.join(", "));
        }
    }

    if malformed > 0 {
        bail!("{malformed} malformed line(s) in {origin}");
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<Client> {
    Client::connect(&config.socket_path)
        .await
        .with_context(|| format!("daemon not reachable at {}", config.socket_path.display()))
}

async fn status(config: &Config) -> Result<()> {
    let mut client = connect(config).await?;

    match client.request(&Request::GetStatus).await? {
        Response::Status(status) => {
            println!("version:      {}", status.version);
            println!("tap active:   {}", status.tap_active);
            if status.permission_denied {
                println!("permission:   Accessibility access missing");
            }
            println!("hotkeys:      {}", status.hotkeys);
            println!("uptime:       {}s", status.uptime_secs);
            println!("switches:     {} ok, {} failed", status.switches_ok, status.switches_failed);
            if let Some(last) = status.last_switch {
                let outcome = if last.ok { "ok" } else { "failed" };
                println!("last switch:  {} -> {} ({outcome})", last.hotkey, last.target);
            }
            Ok(())
        }
        Response::Error { code, message } => bail!("{code}: {message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn reload(config: &Config) -> Result<()> {
    let mut client = connect(config).await?;

    match client.request(&Request::Reload).await? {
        Response::Reloaded { hotkeys } => {
            println!("reloaded {hotkeys} hotkey(s)");
            Ok(())
        }
        Response::Error { code, message } => bail!("{code}: {message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn reset(config: &Config) -> Result<()> {
    let mut client = connect(config).await?;

    match client.request(&Request::Reset).await? {
        Response::ResetDone => {
            println!("cycle and debounce state reset");
            Ok(())
        }
        Response::Error { code, message } => bail!("{code}: {message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn stream_events(config: &Config) -> Result<()> {
    let mut client = connect(config).await?;

    match client.request(&Request::Subscribe).await? {
        Response::Subscribed => {}
        other => bail!("unexpected response: {other:?}"),
    }

    loop {
        match client.next_notification().await? {
            Notification::Event(event) => println!("{event}"),
            Notification::Lagged { skipped } => println!("... {skipped} event(s) missed"),
        }
    }
}

fn service(config: &Config, action: ServiceAction) -> Result<()> {
    let executable = std::env::current_exe().context("cannot locate the puck executable")?;
    let manager = ServiceManager::new(
        &config.home,
        executable,
        config.log_path.clone(),
        config.data_dir.clone(),
    );

    match action {
        ServiceAction::Install => {
            manager.install()?;
            println!("Service installed at {}", manager.agent_path().display());
        }
        ServiceAction::Uninstall => {
            manager.uninstall()?;
            println!("Service uninstalled");
        }
        ServiceAction::Start => {
            manager.start()?;
            println!("Service started");
        }
        ServiceAction::Stop => {
            manager.stop()?;
            println!("Service stopped");
        }
        ServiceAction::Restart => {
            manager.restart()?;
            println!("Service restarted");
        }
        ServiceAction::Status => {
            let status = manager.status()?;
            info!(?status, "service status");
            println!("installed: {}", status.installed);
            println!("running:   {}", status.running);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::flags;

    #[test]
    fn test_observer_forwards_and_passes_through() {
        let (keys_tx, mut keys_rx) = mpsc::unbounded_channel();
        let mut observer = Observer { keys: keys_tx };

        // cmd + space
        let consumed = observer.on_key_down(RawKeyEvent { keycode: 49, flags: flags::COMMAND });
        assert!(!consumed);
        assert_eq!(keys_rx.try_recv().unwrap().to_string(), "cmd-space");
    }

    #[test]
    fn test_observer_survives_closed_printer() {
        let (keys_tx, keys_rx) = mpsc::unbounded_channel();
        drop(keys_rx);
        let mut observer = Observer { keys: keys_tx };

        assert!(!observer.on_key_down(RawKeyEvent { keycode: 0, flags: 0 }));
    }
}
