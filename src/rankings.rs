use anyhow::Result;
use rusqlite::Connection;

use crate::store::{self, METRIC_ALLOWLIST, PlayerRow};
use crate::thresholds::ThresholdCache;

const MIN_POOL: usize = 25;
const POOL_FACTOR: usize = 5;

/// A candidate scored against the elite thresholds. `elite_metrics`
/// lists the tracked metrics where the player clears the 90th
/// percentile; strictly greater counts, ties do not.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RankedPlayer {
    #[serde(flatten)]
    pub player: PlayerRow,
    pub elite_count: usize,
    pub elite_metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_value: Option<f64>,
}

/// Composite "top players at position" ranking: pull a pool 5x the
/// requested size, keep everyone elite in at least one metric, order by
/// focus metric, then breadth of elite metrics, then efficiency.
pub fn top_players_by_position(
    conn: &Connection,
    thresholds: &ThresholdCache,
    position: &str,
    team: &str,
    focus_metric: Option<&str>,
    limit: usize,
    min_games: i64,
) -> Result<Vec<RankedPlayer>> {
    let limit = store::clamp_limit(limit);
    let pool_limit = (limit * POOL_FACTOR).max(MIN_POOL);
    let pool = store::candidate_pool(conn, position, team, pool_limit, min_games)?;
    let focus = focus_metric.map(store::sanitize_metric);

    let mut ranked: Vec<RankedPlayer> = pool
        .into_iter()
        .filter_map(|player| {
            let elite_metrics: Vec<String> = METRIC_ALLOWLIST
                .iter()
                .filter(|metric| {
                    match (player.metric_value(metric), thresholds.threshold(metric)) {
                        (Some(value), Some(threshold)) => value > threshold,
                        _ => false,
                    }
                })
                .map(|metric| metric.to_string())
                .collect();
            if elite_metrics.is_empty() {
                return None;
            }
            let focus_value = focus.and_then(|metric| player.metric_value(metric));
            Some(RankedPlayer {
                elite_count: elite_metrics.len(),
                elite_metrics,
                focus_value,
                player,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        cmp_desc(a.focus_value, b.focus_value)
            .then_with(|| b.elite_count.cmp(&a.elite_count))
            .then_with(|| cmp_desc(a.player.ts, b.player.ts))
            .then_with(|| cmp_desc(a.player.ppp, b.player.ppp))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

/// Descending order with absent values last.
fn cmp_desc(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::cmp_desc;
    use std::cmp::Ordering;

    #[test]
    fn desc_ordering_puts_missing_values_last() {
        assert_eq!(cmp_desc(Some(2.0), Some(1.0)), Ordering::Less);
        assert_eq!(cmp_desc(Some(1.0), Some(2.0)), Ordering::Greater);
        assert_eq!(cmp_desc(Some(0.0), None), Ordering::Less);
        assert_eq!(cmp_desc(None, Some(0.0)), Ordering::Greater);
    }
}
