use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use sales_dashboard_api::{
    config,
    db::{self, DbConfig},
    services::import::{ImportReport, ImportService},
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "sales-import",
    about = "Import a .csv or .xlsx sales sheet straight into the dashboard database",
    version
)]
struct Cli {
    #[arg(long, help = "Path to the .csv or .xlsx sheet")]
    file: PathBuf,
    #[arg(
        long,
        default_value = "sqlite://sales_dashboard.db?mode=rwc",
        help = "Database to import into"
    )]
    database_url: String,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Run pending migrations before importing"
    )]
    migrate: bool,
    #[arg(long, default_value = "info", help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_tracing(&cli.log_level, false);

    let pool = db::establish_connection_with_config(&DbConfig::for_url(cli.database_url.as_str()))
        .await
        .context("failed to connect to the database")?;
    if cli.migrate {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let service = ImportService::new(Arc::new(pool));
    let report = service
        .import_file(&cli.file)
        .await
        .with_context(|| format!("failed to import {}", cli.file.display()))?;

    info!(
        file = %cli.file.display(),
        imported = report.rows_imported,
        skipped = report.rows_skipped,
        "Import finished"
    );
    print_report(&report)
}

fn print_report(report: &ImportReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialise report")?;
    println!("{json}");
    Ok(())
}
