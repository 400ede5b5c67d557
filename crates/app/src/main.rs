use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use nowbar_core::{AppConfig, NowPlayingState, PlaybackAction, PlayerIdentity};
use nowbar_engine::{
    monospace_width, ArtworkCache, NowPlayingService, PlayerControls, ServiceConfig, StatusLine,
};
use nowbar_providers::{build_executor, build_provider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Points per character when the status line is rendered in a terminal.
const TERMINAL_CHAR_WIDTH: f64 = 7.0;
const FILE_WATCH_POLL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "nowbar", about = "Now playing in your menu bar")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll continuously and print the status line; reads actions on stdin.
    Run,
    /// Poll once and print the current state.
    Status,
    /// Send one playback action (toggle, next, prev, seek N) to the current player.
    Control {
        #[arg(required = true, num_args = 1..)]
        action: Vec<String>,
    },
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Control { action } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            let joined = action.join(" ");
            let action = PlaybackAction::parse(&joined)
                .ok_or_else(|| anyhow!("unknown action '{joined}'"))?;
            control(&cfg, action).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path).await
        }
    }
}

/// Composition root: one cache, one service, one controls binding.
fn build_service(cfg: &AppConfig) -> NowPlayingService {
    let cache = Arc::new(ArtworkCache::new(
        artwork_cache_dir(cfg),
        cfg.service.memory_cache_capacity,
    ));
    NowPlayingService::new(build_provider(), cache, ServiceConfig::from_app_config(cfg))
}

enum InputOutcome {
    Continue,
    Quit,
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf) -> Result<()> {
    let service = build_service(&cfg);
    let controls = PlayerControls::new(service.clone(), build_executor());
    let measure = monospace_width(TERMINAL_CHAR_WIDTH);

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(cfg_path.clone(), reload_tx).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut updates = service.subscribe();
    let mut last_line: Option<String> = None;
    let mut last_artwork: Option<String> = None;

    service.start();
    info!(cache = %service.cache().dir().display(), "nowbar started");

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(state) = update else { break };
                report_artwork(&service, state.as_ref(), &mut last_artwork).await;
                let line = StatusLine::project(state.as_ref(), &cfg.preferences, &measure).render();
                if last_line.as_deref() != Some(line.as_str()) {
                    println!("{line}");
                    last_line = Some(line);
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(input)) => {
                        if let InputOutcome::Quit = handle_input(&input, &controls) {
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        warn!(error = %err, "stdin closed");
                        stdin_open = false;
                    }
                }
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            cfg = new_cfg;
                            service.update_config(ServiceConfig::from_app_config(&cfg));
                            let line = StatusLine::project(
                                service.current().as_ref(),
                                &cfg.preferences,
                                &measure,
                            )
                            .render();
                            println!("{line}");
                            last_line = Some(line);
                            info!("configuration reloaded");
                        }
                        Err(err) => {
                            error!(error = %err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    service.stop();
    service.flush_artwork_writes().await;
    Ok(())
}

fn handle_input(input: &str, controls: &PlayerControls) -> InputOutcome {
    let input = input.trim();
    if input.is_empty() {
        return InputOutcome::Continue;
    }
    if matches!(input, "quit" | "exit" | "q") {
        return InputOutcome::Quit;
    }
    match PlaybackAction::parse(input) {
        Some(action) => {
            if controls.dispatch(action).is_none() {
                eprintln!("current source ({:?}) cannot be controlled", controls.target());
            }
        }
        None => eprintln!("unknown command '{input}' (toggle, next, prev, seek N, quit)"),
    }
    InputOutcome::Continue
}

async fn report_artwork(
    service: &NowPlayingService,
    state: Option<&NowPlayingState>,
    last: &mut Option<String>,
) {
    let id = state.and_then(|s| s.artwork_id.clone());
    if id == *last {
        return;
    }
    if let Some(key) = &id {
        match service.cache().get(key).await {
            Some(art) => debug!(key = %key, width = art.width, height = art.height, "artwork ready"),
            None => debug!(key = %key, "artwork not on disk yet"),
        }
    }
    *last = id;
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let service = build_service(cfg);
    match service.poll_now().await {
        Some(state) => {
            let identity = PlayerIdentity::classify(state.source_app_identity.as_deref());
            println!("source: {identity:?}");
            println!("state: {}", if state.is_playing { "playing" } else { "paused" });
            println!("track: {} - {}", state.artist, state.title);
            if let Some(album) = &state.album {
                println!("album: {album}");
            }
            println!(
                "position: {:.0}s / {:.0}s ({:.0}%)",
                state.current_time,
                state.total_time,
                state.progress() * 100.0
            );
            match &state.artwork_id {
                Some(key) => {
                    service.flush_artwork_writes().await;
                    println!("artwork: {}", service.cache().path_for(key).display());
                }
                None => println!("artwork: <none>"),
            }
            let line = StatusLine::project(
                Some(&state),
                &cfg.preferences,
                monospace_width(TERMINAL_CHAR_WIDTH),
            );
            println!("status line: {}", line.render());
        }
        None => println!("state: idle"),
    }
    Ok(())
}

async fn control(cfg: &AppConfig, action: PlaybackAction) -> Result<()> {
    let service = build_service(cfg);
    service.poll_now().await;
    let controls = PlayerControls::new(service.clone(), build_executor());

    let dispatched = controls
        .dispatch(action)
        .ok_or_else(|| anyhow!("current source ({:?}) cannot be controlled", controls.target()))?;
    dispatched.command.await.context("command task failed")?;
    dispatched.reconcile.await.context("reconcile task failed")?;

    match service.current() {
        Some(state) => println!("{:?}: {} - {}", dispatched.target, state.artist, state.title),
        None => println!("{:?}: idle", dispatched.target),
    }
    service.flush_artwork_writes().await;
    Ok(())
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== nowbar doctor ==");

    let provider = build_provider();
    println!("Provider: {}", provider.name());
    println!("Command executor: {}", build_executor().name());

    match provider.fetch_now_playing().await {
        Ok(Some(info)) => {
            let identity = PlayerIdentity::classify(info.source_app_identity.as_deref());
            println!("Now playing: {} - {} ({identity:?})", info.artist, info.title);
            println!(
                "Controllable: {}",
                if identity.is_controllable() { "yes" } else { "no" }
            );
        }
        Ok(None) => println!("No active media source"),
        Err(err) => println!("Provider error: {err:#}"),
    }

    let dir = artwork_cache_dir(cfg);
    match tokio::fs::create_dir_all(&dir).await {
        Ok(()) => println!("Artwork cache: {} (writable)", dir.display()),
        Err(err) => println!("Artwork cache: {} ({err})", dir.display()),
    }

    #[cfg(target_os = "macos")]
    {
        println!(
            "macOS automation: verify System Settings > Privacy & Security > Automation allows your terminal to control Spotify and Music"
        );
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nowbar").join("config.toml")
}

fn artwork_cache_dir(cfg: &AppConfig) -> PathBuf {
    cfg.service.cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("nowbar")
            .join("artwork")
    })
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

fn apply_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("NOWBAR_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Some(v) = lookup("NOWBAR_POLL_INTERVAL") {
        if let Ok(parsed) = v.trim().parse::<f64>() {
            cfg.preferences.poll_interval_secs = parsed;
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        loop {
            tokio::time::sleep(FILE_WATCH_POLL).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                let _ = tx_poll.send(()).await;
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}
