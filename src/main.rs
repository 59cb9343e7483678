// src/main.rs

use anyhow::{bail, Context, Result};
use cqlschema::{
    config::{SchemaConfig, CONFIG_ENV},
    fixture::Fixture,
    refresh::log_warnings,
    CqlGenerator, SchemaRefresher,
};
use std::{env, sync::Arc};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: cqlschema <fixture.yaml> [--json] [--compact] [--internals]";

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) arguments ────────────────────────────────────────────────
    let mut path = None;
    let (mut json, mut compact, mut internals) = (false, false, false);
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "--compact" => compact = true,
            "--internals" => internals = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other if other.starts_with('-') => bail!("unknown flag {}\n{}", other, USAGE),
            other => path = Some(other.to_string()),
        }
    }
    let Some(path) = path else {
        bail!(USAGE);
    };

    // ─── 3) load fixture, config from env overrides the fixture's ───
    let fixture = Fixture::from_path(&path)?;
    let config = if env::var_os(CONFIG_ENV).is_some() {
        SchemaConfig::from_env()?
    } else {
        fixture.config.clone()
    };
    info!(node = %fixture.node, tables = fixture.tables.len(), "loaded fixture");

    // ─── 4) refresh ──────────────────────────────────────────────────
    let refresher = SchemaRefresher::new(config);
    let start = Instant::now();
    refresher
        .refresh(&fixture.node, Arc::new(fixture.channel()?))
        .await
        .with_context(|| format!("refreshing schema from {}", path))?;
    let published = refresher
        .published()
        .context("refresh succeeded but published nothing")?;
    let (metadata, warnings) = (&published.metadata, &published.warnings);
    log_warnings(warnings);
    info!(
        family = %metadata.family(),
        keyspaces = metadata.keyspaces().len(),
        warnings = warnings.len(),
        elapsed = ?start.elapsed(),
        "refresh done"
    );

    // ─── 5) print ────────────────────────────────────────────────────
    if json {
        println!("{}", serde_json::to_string_pretty(&**metadata)?);
        return Ok(());
    }
    let generator = if compact {
        CqlGenerator::compact()
    } else {
        CqlGenerator::pretty()
    };
    for keyspace in metadata.keyspaces().values() {
        println!("{}\n", generator.describe_with_children(keyspace, internals));
    }
    Ok(())
}
