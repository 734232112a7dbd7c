//! `tally` binary.
//!
//! Reads `tally.toml` (or the path given with `--config`) layered under
//! `TALLY_*` environment variables, opens the SQLite ledger, and either
//! serves the HTTP API or runs one reconciliation pass.
//!
//! Nested settings use `__` in environment variables, e.g.
//! `TALLY_LEDGER__TERMINAL_POLICY=reject`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tally_core::ledger::Ledger;
use tally_server::{AppState, ServerConfig};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally event ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tally.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API.
  Serve,
  /// Run the daily reconciliation once and print the result as JSON.
  Reconcile {
    /// Look-back window; defaults to `reconciliation.hours_back`.
    #[arg(long)]
    hours_back: Option<u32>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("TALLY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, &server_cfg.store)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let ledger = Ledger::new(Arc::new(store), server_cfg.ledger.clone());
  let state = AppState::new(ledger, server_cfg.reconciliation.clone());

  match cli.command {
    Command::Serve => {
      let app = tally_server::router(state);
      let address = format!("{}:{}", server_cfg.host, server_cfg.port);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
    }
    Command::Reconcile { hours_back } => {
      let hours_back = hours_back.unwrap_or(server_cfg.reconciliation.hours_back);
      let result = state.reconciler.run_daily_reconciliation(hours_back).await;
      println!("{}", serde_json::to_string_pretty(&result)?);
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
