use std::path::PathBuf;

use anyhow::{Context, Result};

use cerebro_scout::{store, thresholds};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let min_games = std::env::args()
        .nth(1)
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(5);

    let db_path = resolve_db_path()?;
    let conn = store::open_db(&db_path)?;
    let cache_path = resolve_thresholds_path()?;

    let now_secs = chrono::Utc::now().timestamp().max(0) as u64;
    let cache = thresholds::rebuild_thresholds(&conn, min_games, now_secs)?;
    thresholds::save_cache_file(&cache_path, &cache)?;

    println!("Threshold rebuild complete");
    println!("Cache: {}", cache_path.display());
    println!(
        "min_games={} percentile={} sample_size={}",
        cache.min_games, cache.percentile, cache.sample_size
    );
    for (metric, value) in &cache.thresholds {
        println!("  {metric} >= {value:.3}");
    }
    Ok(())
}

fn resolve_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CEREBRO_DB_PATH") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    store::default_db_path().context("unable to resolve sqlite path")
}

fn resolve_thresholds_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CEREBRO_THRESHOLDS_PATH") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    thresholds::default_cache_path().context("unable to resolve thresholds cache path")
}
