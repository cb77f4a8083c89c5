use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warehouse_pipeline::{
    check_sources, open_warehouse, Pipeline, PipelineConfig, TracingReporter,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config_path, db_path) = parse_args()?;

    let config = match config_path {
        Some(path) => PipelineConfig::from_json_file(&path)?,
        None => PipelineConfig::default(),
    };

    // 1. Every source file must exist before the warehouse is touched
    check_sources(&config)?;

    // 2. Warehouse connection; failure here aborts the run
    let conn = open_warehouse(&db_path)?;
    info!(db = %db_path.display(), "Warehouse connection initialized");

    // 3. Run all domains; per-domain failures are logged, not fatal
    let reporter = TracingReporter;
    let summary = Pipeline::new(config, &conn, &reporter).run()?;

    if summary.all_done() {
        info!("All datasets processed successfully");
    } else {
        error!(?summary, "Run finished with domain failures");
    }

    Ok(())
}

fn parse_args() -> Result<(Option<PathBuf>, PathBuf)> {
    let mut config_path = None;
    let mut db_path = PathBuf::from("warehouse.db");

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config requires a file path"),
            },
            "--db" => match args.next() {
                Some(path) => db_path = PathBuf::from(path),
                None => bail!("--db requires a file path"),
            },
            "--help" | "-h" => {
                println!("warehouse-pipeline {}", warehouse_pipeline::VERSION);
                println!("Usage: warehouse-pipeline [--config <config.json>] [--db <warehouse.db>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok((config_path, db_path))
}
