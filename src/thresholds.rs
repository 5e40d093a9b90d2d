use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::store::{self, METRIC_ALLOWLIST};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "cerebro_scout";
const CACHE_FILE: &str = "thresholds.json";

/// Elite percentile and rebuild window: nearest-rank (round up) at the
/// 90th percentile, refreshed every 12 hours.
pub const ELITE_PERCENTILE: f64 = 0.90;
pub const MAX_AGE_SECS: u64 = 12 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCache {
    pub version: u32,
    pub generated_at: u64,
    pub min_games: i64,
    pub percentile: f64,
    pub sample_size: usize,
    pub thresholds: BTreeMap<String, f64>,
}

impl ThresholdCache {
    pub fn threshold(&self, metric: &str) -> Option<f64> {
        self.thresholds.get(metric).copied()
    }
}

pub fn default_cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// Nearest-rank percentile over finite values, rounding the rank up.
/// Returns None on an empty slice.
pub fn percentile_nearest_rank(values: &[f64], percentile: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let rank = (percentile * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    Some(sorted[index])
}

/// Read-through accessor: reuse the persisted cache while it is fresh,
/// otherwise recompute from the store and rewrite the file.
///
/// Concurrent rebuilds can race and overwrite each other; every success
/// writes the same value, so the race is benign but not linearizable.
pub fn get_thresholds(
    conn: &Connection,
    path: &Path,
    min_games: i64,
    now_secs: u64,
) -> Result<ThresholdCache> {
    if let Some(cache) = load_cache_file(path) {
        if is_fresh(&cache, min_games, now_secs) {
            return Ok(cache);
        }
    }
    let cache = rebuild_thresholds(conn, min_games, now_secs)?;
    save_cache_file(path, &cache)?;
    Ok(cache)
}

pub fn is_fresh(cache: &ThresholdCache, min_games: i64, now_secs: u64) -> bool {
    if cache.version != CACHE_VERSION || cache.min_games != min_games {
        return false;
    }
    if now_secs.saturating_sub(cache.generated_at) > MAX_AGE_SECS {
        return false;
    }
    METRIC_ALLOWLIST
        .iter()
        .all(|metric| cache.thresholds.contains_key(*metric))
}

/// Recompute the per-metric elite thresholds across the population with
/// at least `min_games` games played.
pub fn rebuild_thresholds(
    conn: &Connection,
    min_games: i64,
    now_secs: u64,
) -> Result<ThresholdCache> {
    let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(METRIC_ALLOWLIST.len());
    for metric in METRIC_ALLOWLIST {
        let values = store::metric_values(conn, metric, min_games)
            .with_context(|| format!("load values for metric {metric}"))?;
        columns.push((metric.to_string(), values));
    }
    let sample_size = columns.iter().map(|(_, values)| values.len()).max().unwrap_or(0);

    let thresholds: BTreeMap<String, f64> = columns
        .into_par_iter()
        .filter_map(|(metric, values)| {
            percentile_nearest_rank(&values, ELITE_PERCENTILE).map(|value| (metric, value))
        })
        .collect();

    Ok(ThresholdCache {
        version: CACHE_VERSION,
        generated_at: now_secs,
        min_games,
        percentile: ELITE_PERCENTILE,
        sample_size,
        thresholds,
    })
}

pub fn load_cache_file(path: &Path) -> Option<ThresholdCache> {
    let raw = fs::read_to_string(path).ok()?;
    let cache = serde_json::from_str::<ThresholdCache>(&raw).ok()?;
    if cache.version != CACHE_VERSION {
        return None;
    }
    Some(cache)
}

pub fn save_cache_file(path: &Path, cache: &ThresholdCache) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize threshold cache")?;
    fs::write(&tmp, json).context("write threshold cache")?;
    fs::rename(&tmp, path).context("swap threshold cache")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::percentile_nearest_rank;

    #[test]
    fn nearest_rank_rounds_up() {
        // 100 ascending values: rank ceil(0.9 * 100) = 90, index 89.
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile_nearest_rank(&values, 0.90), Some(90.0));
    }

    #[test]
    fn nearest_rank_small_samples() {
        assert_eq!(percentile_nearest_rank(&[5.0], 0.90), Some(5.0));
        assert_eq!(percentile_nearest_rank(&[2.0, 1.0, 3.0], 0.90), Some(3.0));
        assert_eq!(percentile_nearest_rank(&[], 0.90), None);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let values = [1.0, f64::NAN, 2.0, f64::INFINITY, 3.0];
        assert_eq!(percentile_nearest_rank(&values, 0.90), Some(3.0));
    }
}
