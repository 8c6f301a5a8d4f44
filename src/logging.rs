use directories::ProjectDirs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, Registry};

const LEVEL_ENV: &str = "SNAPSOLVE_LOG";

pub fn log_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "snapsolve", "snapsolve").map(|dirs| dirs.data_dir().join("logs"))
}

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO)
}

/// Send `tracing` output to `snapsolve.log` in the data directory. Stdout
/// belongs to the answer stream, so nothing is logged to the terminal.
pub fn init_logging() -> anyhow::Result<()> {
    let Some(dir) = log_dir() else {
        return Ok(());
    };
    std::fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("snapsolve.log"))?;

    let level = level_from(std::env::var(LEVEL_ENV).ok().as_deref());
    let file_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_filter(level);

    Registry::default().with(file_layer).try_init()?;
    Ok(())
}
