// src/bin/family_check.rs

//! Print the schema family, system tables and supported table options for each
//! version given on the command line.

use anyhow::{bail, Result};
use cqlschema::{parser::TableOptionKind, SchemaFamily, Version};
use serde::Serialize;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Serialize)]
struct FamilyReport {
    version: String,
    family: String,
    tables: Vec<&'static str>,
    options: Vec<&'static str>,
}

fn report(raw: &str) -> Result<FamilyReport> {
    let version = Version::parse(raw)?;
    let family = SchemaFamily::for_version("cli", &version)?;
    Ok(FamilyReport {
        version: version.to_string(),
        family: family.name().to_string(),
        tables: family.profile().tables.iter().map(|(_, t)| *t).collect(),
        options: TableOptionKind::ALL
            .iter()
            .filter(|k| k.is_supported(family, &version))
            .map(|k| k.cql_name())
            .collect(),
    })
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let versions: Vec<String> = env::args().skip(1).collect();
    if versions.is_empty() {
        bail!("usage: family_check <version>...");
    }

    let mut reports = Vec::with_capacity(versions.len());
    for raw in &versions {
        match report(raw) {
            Ok(r) => {
                info!(version = %r.version, family = %r.family, "resolved");
                reports.push(r);
            }
            Err(e) => warn!(version = %raw, error = %e, "skipping"),
        }
    }
    print!("{}", serde_yaml::to_string(&reports)?);
    Ok(())
}
