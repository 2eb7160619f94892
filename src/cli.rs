use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use loghopper::config::AppConfig;
use loghopper::ingest::{IngestPipeline, IngestReport, parse_bytes};
use loghopper::logging;
use loghopper::store::{JsonFileStore, RecordStore};
use loghopper::watcher::{IngestEvent, RunStats, WatcherService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "loghopper",
    version,
    about = "Ingest factory test logs from a drop folder into a versioned record store"
)]
pub struct Cli {
    /// Config file. Defaults to <config dir>/loghopper/config.json
    #[arg(long, global = true, env = "LOGHOPPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `loghopper=trace`. Overrides the config file.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the drop folder until Ctrl-C
    Watch {
        /// Folder to watch
        #[arg(long)]
        root: Option<PathBuf>,

        /// Glob matched against file names
        #[arg(long)]
        pattern: Option<String>,

        /// Include subdirectories
        #[arg(long)]
        recursive: bool,

        /// Maximum concurrent ingestions
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Parse one log and print the record as JSON (nothing is stored)
    Parse {
        file: PathBuf,

        #[arg(long)]
        pretty: bool,
    },
    /// Ingest files right away, without waiting for stability
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the stored record for a key
    Show { key: String },
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::default_path()?),
        }
    }

    /// Load the config file and apply global overrides.
    pub fn load_config(&self) -> Result<AppConfig> {
        let path = self.config_path()?;
        let mut config = AppConfig::load_from(&path)?;
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        Ok(config)
    }
}

pub async fn run_command(command: Commands, mut config: AppConfig, config_path: &Path) -> Result<()> {
    match command {
        Commands::Watch {
            root,
            pattern,
            recursive,
            concurrency,
        } => {
            if let Some(root) = root {
                config.watch.root = root;
            }
            if let Some(pattern) = pattern {
                config.watch.pattern = pattern;
            }
            if recursive {
                config.watch.recursive = true;
            }
            if let Some(concurrency) = concurrency {
                config.watch.max_concurrent = concurrency;
            }
            handle_watch(config).await
        }
        Commands::Parse { file, pretty } => handle_parse(&config, &file, pretty).await,
        Commands::Ingest { files } => handle_ingest(&config, &files).await,
        Commands::Show { key } => handle_show(&config, &key).await,
        Commands::InitConfig { force } => handle_init_config(config_path, force),
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn RecordStore>> {
    let store = JsonFileStore::open(&config.store.path)
        .with_context(|| format!("Failed to open record store at {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

async fn handle_watch(config: AppConfig) -> Result<()> {
    config.validate()?;
    let store = open_store(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        on_signal.cancel();
    });

    println!(
        "Watching {} for {} (Ctrl-C to stop)",
        config.watch.root.display(),
        config.watch.pattern
    );
    if config.logging.file_output
        && let Ok(path) = logging::current_log_path(&config.logging)
    {
        println!("Logging to {}", path.display());
    }
    let summary = WatcherService::new(config, store).run(cancel).await?;
    println!("{summary}");
    Ok(())
}

async fn handle_parse(config: &AppConfig, file: &Path, pretty: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let record = parse_bytes(bytes, &file_name, &config.parser)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let json = if pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    println!("{json}");
    Ok(())
}

async fn handle_ingest(config: &AppConfig, files: &[PathBuf]) -> Result<()> {
    let store = open_store(config)?;
    let pipeline = IngestPipeline::from_config(config, store, Arc::new(RunStats::new()));

    for file in files {
        match pipeline.ingest(file, None).await {
            IngestReport::Completed(event) => print_event(&event),
            IngestReport::Vanished => println!("{}: not found", file.display()),
            IngestReport::Changed { .. } => println!("{}: changed while reading", file.display()),
        }
    }

    let summary = pipeline.stats().snapshot();
    println!("{summary}");
    if summary.failed() > 0 {
        anyhow::bail!("{} of {} file(s) failed", summary.failed(), files.len());
    }
    Ok(())
}

fn print_event(event: &IngestEvent) {
    match event {
        IngestEvent::Inserted { path, key, version, .. } => {
            println!("{path}: inserted {key} v{version}");
        }
        IngestEvent::Updated { path, key, version, .. } => {
            println!("{path}: updated {key} to v{version}");
        }
        IngestEvent::Duplicate { path, key, version } => {
            println!("{path}: duplicate of {key} v{version}");
        }
        IngestEvent::Failed { path, kind, error } => println!("{path}: {kind} error: {error}"),
    }
}

async fn handle_show(config: &AppConfig, key: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.load(key).await? {
        Some(stored) => {
            println!("{}", serde_json::to_string_pretty(&stored.record)?);
        }
        None => println!("{key}: not found"),
    }
    Ok(())
}

fn handle_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AppConfig::default().save_to(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "loghopper",
            "watch",
            "--root",
            "/drop",
            "--config",
            "/tmp/c.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Watch { root: Some(_), .. }));
    }

    #[test]
    fn test_ingest_requires_files() {
        assert!(Cli::try_parse_from(["loghopper", "ingest"]).is_err());
    }
}
