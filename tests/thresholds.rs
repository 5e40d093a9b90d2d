use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;

use cerebro_scout::store::{self, PlayerRow};
use cerebro_scout::thresholds::{self, ThresholdCache};

fn temp_cache_path(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cerebro_scout_test_{}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join(format!("{tag}.json"))
}

/// 100 players, pts_g 1..=100, every other tracked metric constant so
/// the cache is complete and only the points threshold varies.
fn population(games: i64) -> Connection {
    let conn = store::open_in_memory().expect("in-memory store should open");
    for idx in 1..=100 {
        let mut player = PlayerRow {
            unique_id: format!("p{idx}"),
            name: format!("Player {idx}"),
            team: Some("State".to_string()),
            position: Some("PG".to_string()),
            g: Some(games),
            ..PlayerRow::default()
        };
        player.pts_g = Some(idx as f64);
        player.reb_g = Some(4.0);
        player.ast_g = Some(3.0);
        player.stl_g = Some(1.0);
        player.blk_g = Some(0.5);
        player.fg = Some(0.45);
        player.c_3pt = Some(0.33);
        player.ft = Some(0.75);
        player.efg = Some(0.50);
        player.ts = Some(0.55);
        player.usg = Some(0.20);
        player.ppp = Some(1.0);
        player.a_to = Some(1.5);
        player.orb_40 = Some(3.0);
        player.ram = Some(500.0);
        player.c_ram = Some(500.0);
        player.psp = Some(50.0);
        player.c_3pe = Some(50.0);
        player.dsi = Some(50.0);
        player.fgs = Some(50.0);
        player.bms = Some(50.0);
        store::upsert_player(&conn, &player).expect("seed player should insert");
    }
    conn
}

#[test]
fn ninetieth_percentile_is_the_ninetieth_sorted_value() {
    let conn = population(10);
    let cache =
        thresholds::rebuild_thresholds(&conn, 5, 1_000).expect("rebuild should succeed");
    // ceil(0.9 * 100) - 1 = 89 zero-indexed, i.e. the value 90.
    assert_eq!(cache.threshold("pts_g"), Some(90.0));
    assert_eq!(cache.min_games, 5);
    assert_eq!(cache.sample_size, 100);
}

#[test]
fn fresh_cache_is_reused_without_touching_the_store() {
    let conn = population(10);
    let path = temp_cache_path("fresh_reuse");
    let first = thresholds::get_thresholds(&conn, &path, 5, 1_000).expect("first read");

    // Shift the whole population; a fresh cache must not notice.
    for idx in 1..=100 {
        conn.execute(
            "UPDATE players SET pts_g = pts_g + 50 WHERE unique_id = ?1",
            [format!("p{idx}")],
        )
        .expect("update should succeed");
    }
    let second = thresholds::get_thresholds(&conn, &path, 5, 2_000).expect("second read");
    assert_eq!(second.generated_at, first.generated_at);
    assert_eq!(second.threshold("pts_g"), Some(90.0));
    fs::remove_file(&path).ok();
}

#[test]
fn cache_older_than_twelve_hours_rebuilds() {
    let conn = population(10);
    let path = temp_cache_path("stale_rebuild");
    let built_at = 1_000;
    let first = thresholds::get_thresholds(&conn, &path, 5, built_at).expect("first read");
    assert_eq!(first.generated_at, built_at);

    let just_inside = built_at + 12 * 60 * 60;
    let reused = thresholds::get_thresholds(&conn, &path, 5, just_inside).expect("reuse read");
    assert_eq!(reused.generated_at, built_at);

    let just_past = built_at + 12 * 60 * 60 + 1;
    let rebuilt = thresholds::get_thresholds(&conn, &path, 5, just_past).expect("rebuild read");
    assert_eq!(rebuilt.generated_at, just_past);
    fs::remove_file(&path).ok();
}

#[test]
fn min_games_mismatch_rebuilds() {
    let conn = population(10);
    let path = temp_cache_path("min_games_rebuild");
    let first = thresholds::get_thresholds(&conn, &path, 5, 1_000).expect("first read");
    let second = thresholds::get_thresholds(&conn, &path, 8, 1_001).expect("second read");
    assert_ne!(first.min_games, second.min_games);
    assert_eq!(second.generated_at, 1_001);
    fs::remove_file(&path).ok();
}

#[test]
fn missing_tracked_metric_marks_cache_stale() {
    let mut cache = ThresholdCache {
        version: 1,
        generated_at: 1_000,
        min_games: 5,
        percentile: 0.90,
        sample_size: 100,
        thresholds: Default::default(),
    };
    for metric in cerebro_scout::store::METRIC_ALLOWLIST {
        cache.thresholds.insert(metric.to_string(), 1.0);
    }
    assert!(thresholds::is_fresh(&cache, 5, 1_000));

    cache.thresholds.remove("ts");
    assert!(!thresholds::is_fresh(&cache, 5, 1_000));
}

#[test]
fn min_games_floor_excludes_short_seasons() {
    let conn = population(3);
    let cache = thresholds::rebuild_thresholds(&conn, 5, 1_000).expect("rebuild runs");
    // Nobody qualifies, so no thresholds are computable.
    assert_eq!(cache.threshold("pts_g"), None);
    assert_eq!(cache.sample_size, 0);
}
