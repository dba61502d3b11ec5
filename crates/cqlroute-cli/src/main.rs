//! cqlroute CLI
//!
//! Command-line interface for authoring and checking routing configurations

use anyhow::Context;
use clap::{Parser, Subcommand};
use cqlroute_config_file::FileConfigSource;
use cqlroute_core::{
    ConfigSource, LoggingConfig, RoutingConfig, SessionFactory, Statement,
    memory::InMemorySessionProvider,
};
use cqlroute_observability::{RoutingMetrics, logging::init_tracing};
use cqlroute_routing::{
    ConfigReloader, ContextLookupKeyResolver, MapSessionFactoryLookup, RoutingSessionFactory,
    RoutingTable, apply_config,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cqlroute")]
#[command(about = "cqlroute - Lookup-key routing for Cassandra sessions", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides the
    /// configuration file
    #[arg(long, global = true, env = "CQLROUTE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON; also enabled by `logging.json` in the configuration
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample routing configuration
    Init {
        #[arg(default_value = "~/.cqlroute/routes.yaml")]
        path: PathBuf,
    },
    /// Load a configuration and build its routing table
    Validate {
        #[arg(default_value = "~/.cqlroute/routes.yaml")]
        path: PathBuf,
    },
    /// Show which session a lookup key is routed to
    Resolve {
        #[arg(default_value = "~/.cqlroute/routes.yaml")]
        path: PathBuf,

        /// Lookup key; omit to resolve without a key
        #[arg(long)]
        key: Option<String>,

        /// CQL statement to execute against the resolved session
        #[arg(long)]
        execute: Option<String>,

        /// Print routing metrics when done
        #[arg(long)]
        metrics: bool,
    },
    /// Reload routes whenever the configuration file changes
    Watch {
        #[arg(default_value = "~/.cqlroute/routes.yaml")]
        path: PathBuf,

        /// Print routing metrics on shutdown
        #[arg(long)]
        metrics: bool,
    },
}

impl Commands {
    /// Configuration file read by this command, if it reads one
    fn config_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Init { .. } => None,
            Self::Validate { path } | Self::Resolve { path, .. } | Self::Watch { path, .. } => {
                Some(path)
            }
        }
    }
}

/// Log level and format: explicit flags win over the configuration file
fn logging_settings(cli: &Cli, config: Option<&LoggingConfig>) -> (String, bool) {
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.map(|logging| logging.level.clone()))
        .unwrap_or_else(|| LoggingConfig::default().level);
    let json = cli.json_logs || config.is_some_and(|logging| logging.json);
    (level, json)
}

fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<RoutingConfig> {
    let source = FileConfigSource::new(expand(path))
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut config = source.load().await?;
    config.merge_env();
    source.validate(&config)?;
    Ok(config)
}

fn describe(table: &RoutingTable<String>) -> String {
    let mut keys: Vec<_> = table.keys().cloned().collect();
    keys.sort();

    let mut out = format!(
        "generation {}: {} route(s), default {}, lenient fallback {}\n",
        table.generation(),
        table.len(),
        if table.has_default() { "set" } else { "unset" },
        if table.is_lenient() { "on" } else { "off" },
    );
    for key in keys {
        out.push_str(&format!("  {}\n", key));
    }
    out
}

/// Build a router for `config` that always resolves `key`
fn build_router(
    config: &RoutingConfig,
    key: Option<String>,
    metrics: Option<Arc<RoutingMetrics>>,
) -> anyhow::Result<RoutingSessionFactory<String>> {
    let lookup = Arc::new(MapSessionFactoryLookup::new());
    let mut router = RoutingSessionFactory::new(move || key.clone());
    if let Some(metrics) = metrics {
        router = router.with_metrics(metrics);
    }
    router.set_session_factory_lookup(lookup.clone());

    apply_config(&router, &lookup, &InMemorySessionProvider, config)?;
    Ok(router)
}

async fn resolve(
    config: &RoutingConfig,
    key: Option<String>,
    execute: Option<String>,
    metrics: Option<Arc<RoutingMetrics>>,
) -> anyhow::Result<String> {
    let router = build_router(config, key.clone(), metrics)?;
    let session = router.get_session()?;

    let mut out = format!(
        "{} -> keyspace {}\n",
        key.as_deref().unwrap_or("<none>"),
        session.keyspace().unwrap_or("<none>")
    );

    if let Some(cql) = execute {
        let result = session.execute(Statement::new(cql)).await?;
        out.push_str(&serde_json::to_string_pretty(&result.rows)?);
        out.push('\n');
    }

    Ok(out)
}

async fn watch(path: PathBuf, metrics: Option<Arc<RoutingMetrics>>) -> anyhow::Result<()> {
    let source = Arc::new(FileConfigSource::new(expand(&path)).await?);

    let mut router = RoutingSessionFactory::<String>::new(ContextLookupKeyResolver::new());
    if let Some(metrics) = metrics {
        router = router.with_metrics(metrics);
    }

    let reloader = ConfigReloader::new(
        Arc::new(router),
        Arc::new(MapSessionFactoryLookup::new()),
        Arc::new(InMemorySessionProvider),
        source,
    );
    reloader.reload().await?;

    if let Some(table) = reloader.router().routing_table() {
        print!("{}", describe(&table));
    }

    tokio::select! {
        result = reloader.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.command.config_path() {
        Some(path) => Some(load_config(path).await?),
        None => None,
    };

    let (log_level, json_logs) = logging_settings(&cli, config.as_ref().map(|c| &c.logging));
    init_tracing(&log_level, json_logs).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Init { path } => {
            let path = expand(&path);
            FileConfigSource::create(&path, &RoutingConfig::sample()).await?;
            println!("Wrote sample configuration to {}", path.display());
        }
        Commands::Validate { .. } => {
            let config = config.context("configuration not loaded")?;
            let router = build_router(&config, None, None)?;
            if let Some(table) = router.routing_table() {
                print!("{}", describe(&table));
            }
        }
        Commands::Resolve {
            key,
            execute,
            metrics,
            ..
        } => {
            let config = config.context("configuration not loaded")?;
            let metrics = if metrics {
                Some(Arc::new(RoutingMetrics::new()?))
            } else {
                None
            };

            print!("{}", resolve(&config, key, execute, metrics.clone()).await?);

            if let Some(metrics) = metrics {
                print!("{}", metrics.gather_text()?);
            }
        }
        Commands::Watch { path, metrics } => {
            let metrics = if metrics {
                Some(Arc::new(RoutingMetrics::new()?))
            } else {
                None
            };

            watch(path, metrics.clone()).await?;

            if let Some(metrics) = metrics {
                print!("{}", metrics.gather_text()?);
            }
        }
    }

    Ok(())
}
