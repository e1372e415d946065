//! qcache binary.
//!
//! Resolves the effective options from the command line and `--config`, probes for connection
//! credentials once, and reports how the query cache and connection authentication would be set
//! up. `--dump_config` writes the resolved options back out as TOML.

use clap::Parser;
use qcache_cli::QcacheArgs;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

const LOG_TARGET: &str = "qcache::bin";

fn main() -> anyhow::Result<()> {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qcache=info"));

    Registry::default().with(tracing_subscriber::fmt::layer()).with(filter_layer).init();

    let args = QcacheArgs::parse().with_config_file()?;

    if let Some(path) = &args.dump_config {
        std::fs::write(path, args.to_toml()?)?;
        info!(target: LOG_TARGET, path = %path.display(), "Wrote effective configuration");
    }

    let query_options = args.cache.query_options();
    info!(
        target: LOG_TARGET,
        backend = ?args.cache.backend,
        namespace = %args.cache.namespace,
        ttl = ?query_options.max_lifetime,
        max_rows = query_options.max_rows,
        "Query cache"
    );

    let mode = args.auth.auth_mode()?;
    info!(
        target: LOG_TARGET,
        ?mode,
        construction = ?args.auth.construction(),
        "Connection authentication"
    );

    Ok(())
}
