//! One-shot backfill for legacy application records.
//!
//! Usage: `migrate [db-path]` (defaults to `DRIVER_INTAKE_DB_PATH`, then
//! `./data/driver-intake.db`). Prints updated/skipped/failed counts and
//! exits non-zero if any record could not be fixed.

use anyhow::Context;

use driver_intake::migration;
use driver_intake::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let db_path = std::env::args().nth(1).unwrap_or_else(|| {
        std::env::var("DRIVER_INTAKE_DB_PATH")
            .unwrap_or_else(|_| "./data/driver-intake.db".to_string())
    });

    eprintln!("Backfilling legacy records in {db_path}");
    let store = LibSqlBackend::new_local(std::path::Path::new(&db_path))
        .await
        .with_context(|| format!("opening database at {db_path}"))?;

    let report = migration::backfill(&store)
        .await
        .context("backfill pass failed")?;
    eprintln!("  updated: {}", report.updated);
    eprintln!("  skipped: {}", report.skipped);
    eprintln!("  failed:  {}", report.failed.len());
    for (id, reason) in &report.failed {
        eprintln!("    {id}: {reason}");
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
