use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scene::{Animator, MemoryScene, SceneObject};
use server::{
    ActionConfig, Listener, Registry, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rigsync-server",
    version,
    about = "Real-time scene synchronization server"
)]
struct Cli {
    /// Interface to listen on.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Action configuration (JSON). Defaults to the standard click/input bindings.
    #[arg(long)]
    actions: Option<PathBuf>,
    /// Initial scene objects (JSON array).
    #[arg(long)]
    scene: Option<PathBuf>,
    /// Idle delay between cycles, in milliseconds.
    #[arg(long, default_value_t = 10)]
    idle_ms: u64,
    /// Maximum objects redrawn per scene update.
    #[arg(long)]
    max_redraw: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig {
        host: cli.host,
        port: cli.port,
        ..ServerConfig::default()
    };
    config.tick.idle_delay = Duration::from_millis(cli.idle_ms);

    let actions = match &cli.actions {
        Some(path) => load_actions(path)?,
        None => ActionConfig::standard(),
    };
    let registry = Registry::from_config(&actions).context("build action registry")?;

    let mut scene = match &cli.scene {
        Some(path) => load_scene(path)?,
        None => MemoryScene::new(),
    };
    if let Some(budget) = cli.max_redraw {
        scene = scene.with_redraw_budget(budget);
    }

    let listener = Listener::bind(&config)
        .with_context(|| format!("bind {}", config.listen_addr()))?;
    let local = listener.local_addr().context("read listen address")?;
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    listener
        .spawn(events_tx)
        .context("spawn acceptor thread")?;
    info!(address = %local, codes = registry.codes().count(), "listening");

    let mut server = Server::new(&config, Arc::new(registry), scene, Animator::new(), events_rx);
    server.run().context("server stopped")?;
    Ok(())
}

fn load_actions(path: &Path) -> Result<ActionConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read action config {}", path.display()))?;
    ActionConfig::from_json(&text).with_context(|| format!("parse {}", path.display()))
}

fn load_scene(path: &Path) -> Result<MemoryScene> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read scene {}", path.display()))?;
    let objects: Vec<SceneObject> =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    MemoryScene::from_objects(objects).with_context(|| format!("load {}", path.display()))
}
