use std::collections::BTreeMap;

use rusqlite::Connection;

use cerebro_scout::rankings::top_players_by_position;
use cerebro_scout::store::{self, PlayerRow};
use cerebro_scout::thresholds::ThresholdCache;

fn fixed_thresholds() -> ThresholdCache {
    let mut thresholds = BTreeMap::new();
    for metric in store::METRIC_ALLOWLIST {
        thresholds.insert(metric.to_string(), 100.0);
    }
    // Only these three are attainable in the seeded data.
    thresholds.insert("pts_g".to_string(), 15.0);
    thresholds.insert("ast_g".to_string(), 5.0);
    thresholds.insert("ts".to_string(), 0.58);
    ThresholdCache {
        version: 1,
        generated_at: 1_000,
        min_games: 5,
        percentile: 0.90,
        sample_size: 4,
        thresholds,
    }
}

fn seeded_store() -> Connection {
    let conn = store::open_in_memory().expect("in-memory store should open");
    let players: [(&str, f64, f64, f64, f64); 4] = [
        // (name, pts, ast, ts, ppp)
        ("Scorer One", 22.0, 2.0, 0.60, 1.10),
        ("Playmaker Two", 16.0, 7.0, 0.54, 1.00),
        ("Balanced Three", 18.0, 6.0, 0.61, 1.05),
        ("Bench Four", 6.0, 1.0, 0.45, 0.80),
    ];
    for (idx, (name, pts, ast, ts, ppp)) in players.into_iter().enumerate() {
        let mut player = PlayerRow {
            unique_id: format!("r{idx}"),
            name: name.to_string(),
            team: Some("State".to_string()),
            position: Some("PG".to_string()),
            g: Some(20),
            ..PlayerRow::default()
        };
        player.pts_g = Some(pts);
        player.ast_g = Some(ast);
        player.ts = Some(ts);
        player.ppp = Some(ppp);
        store::upsert_player(&conn, &player).expect("seed player should insert");
    }
    conn
}

#[test]
fn players_below_every_threshold_are_dropped() {
    let conn = seeded_store();
    let ranked = top_players_by_position(&conn, &fixed_thresholds(), "PG", "", None, 10, 5)
        .expect("ranking should run");
    assert_eq!(ranked.len(), 3);
    assert!(ranked.iter().all(|r| r.player.name != "Bench Four"));
    assert!(ranked.iter().all(|r| r.elite_count > 0));
}

#[test]
fn elite_breadth_orders_when_no_focus_metric() {
    let conn = seeded_store();
    let ranked = top_players_by_position(&conn, &fixed_thresholds(), "PG", "", None, 10, 5)
        .expect("ranking should run");
    // Balanced Three clears pts, ast, and ts; the others clear fewer.
    assert_eq!(ranked[0].player.name, "Balanced Three");
    assert_eq!(ranked[0].elite_count, 3);
    // Tie on elite_count=2 broken by true shooting.
    assert_eq!(ranked[1].player.name, "Scorer One");
    assert_eq!(ranked[2].player.name, "Playmaker Two");
}

#[test]
fn focus_metric_outranks_elite_breadth() {
    let conn = seeded_store();
    let ranked =
        top_players_by_position(&conn, &fixed_thresholds(), "PG", "", Some("ast_g"), 10, 5)
            .expect("ranking should run");
    assert_eq!(ranked[0].player.name, "Playmaker Two");
    assert_eq!(ranked[0].focus_value, Some(7.0));
}

#[test]
fn limit_truncates_after_ranking() {
    let conn = seeded_store();
    let ranked = top_players_by_position(&conn, &fixed_thresholds(), "PG", "", None, 1, 5)
        .expect("ranking should run");
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].player.name, "Balanced Three");
}

#[test]
fn threshold_ties_are_not_elite() {
    let conn = store::open_in_memory().expect("in-memory store should open");
    let mut player = PlayerRow {
        unique_id: "tie-1".to_string(),
        name: "Exactly Ninety".to_string(),
        position: Some("PG".to_string()),
        g: Some(20),
        ..PlayerRow::default()
    };
    player.pts_g = Some(15.0);
    store::upsert_player(&conn, &player).expect("seed player should insert");

    let ranked = top_players_by_position(&conn, &fixed_thresholds(), "PG", "", None, 10, 5)
        .expect("ranking should run");
    // pts_g == threshold exactly; "exceeding" is strictly greater.
    assert!(ranked.is_empty());
}
