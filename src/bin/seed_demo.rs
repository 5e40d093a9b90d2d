use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::Rng;

use cerebro_scout::store::{self, PlayerRow};

const FIRST_NAMES: &[&str] = &[
    "Jalen", "Marcus", "Tyrese", "DeAndre", "Caleb", "Jordan", "Malik", "Trey", "Isaiah", "Devin",
    "Zion", "Cade", "Evan", "Keyonte", "Brandin",
];

const LAST_NAMES: &[&str] = &[
    "Carter", "Williams", "Johnson", "Brooks", "Mitchell", "Hayes", "Turner", "Bryant", "Ellis",
    "Porter", "Reed", "Walker", "Greene", "Foster", "Dawson",
];

const TEAMS: &[&str] = &[
    "State", "Tech", "A&M", "Pacific", "Northern", "Riverside", "Coastal", "Summit", "Valley",
    "Central",
];

const CLASSES: &[&str] = &["Fr", "So", "Jr", "Sr"];

/// Per-position archetype: (pts, reb, ast, stl, blk) per game baselines
/// the jitter is applied around.
const ARCHETYPES: &[(&str, f64, f64, f64, f64, f64)] = &[
    ("PG", 12.0, 3.0, 5.5, 1.4, 0.2),
    ("SG", 14.0, 3.5, 2.5, 1.1, 0.3),
    ("SF", 13.0, 5.5, 2.0, 1.0, 0.6),
    ("PF", 11.0, 7.5, 1.5, 0.8, 1.0),
    ("C", 10.0, 8.5, 1.0, 0.6, 1.6),
];

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let count = std::env::args()
        .nth(1)
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(200)
        .clamp(1, 5000);

    let db_path = resolve_db_path()?;
    let conn = store::open_db(&db_path)?;

    let mut rng = rand::thread_rng();
    for idx in 0..count {
        let player = synth_player(&mut rng, idx);
        store::upsert_player(&conn, &player)?;
    }

    println!("Seeded {count} demo players");
    println!("DB: {}", db_path.display());
    Ok(())
}

fn synth_player(rng: &mut impl Rng, idx: usize) -> PlayerRow {
    let (position, pts, reb, ast, stl, blk) = ARCHETYPES[idx % ARCHETYPES.len()];
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    let team = TEAMS[rng.gen_range(0..TEAMS.len())];

    let pts_g = jitter(rng, pts, 6.0);
    let reb_g = jitter(rng, reb, 2.5);
    let ast_g = jitter(rng, ast, 1.5);
    let fg = rng.gen_range(0.38..0.58);
    let c_3pt = rng.gen_range(0.25..0.42);
    let ft = rng.gen_range(0.60..0.90);
    let min_g = rng.gen_range(14.0..34.0);
    let games = rng.gen_range(4..32);
    let to_g = rng.gen_range(0.8..3.2);
    let efg = fg + c_3pt * 0.15;
    let ts = efg + 0.03;
    let ppp = rng.gen_range(0.85..1.25);
    let usg = rng.gen_range(0.12..0.32);

    PlayerRow {
        unique_id: format!("demo-{idx:04}"),
        name: format!("{first} {last}"),
        team: Some(format!("{team} University")),
        position: Some(position.to_string()),
        league: Some("D1".to_string()),
        class: Some(CLASSES[rng.gen_range(0..CLASSES.len())].to_string()),
        pts_g: Some(pts_g),
        reb_g: Some(reb_g),
        ast_g: Some(ast_g),
        fg: Some(fg),
        c_3pt: Some(c_3pt),
        ft: Some(ft),
        stl_g: Some(jitter(rng, stl, 0.6)),
        blk_g: Some(jitter(rng, blk, 0.5)),
        to_g: Some(to_g),
        min_g: Some(min_g),
        g: Some(games),
        c_2pt: Some(rng.gen_range(0.40..0.60)),
        efg: Some(efg),
        ts: Some(ts),
        usg: Some(usg),
        ppp: Some(ppp),
        orb_g: Some(reb_g * 0.35),
        drb_g: Some(reb_g * 0.65),
        pf_g: Some(rng.gen_range(1.0..3.5)),
        a_to: Some(if to_g > 0.0 { ast_g / to_g } else { ast_g }),
        ram: Some(rng.gen_range(200.0..900.0)),
        c_ram: Some(rng.gen_range(200.0..900.0)),
        psp: Some(rng.gen_range(20.0..90.0)),
        c_3pe: Some(rng.gen_range(20.0..90.0)),
        dsi: Some(rng.gen_range(20.0..90.0)),
        fgs: Some(rng.gen_range(20.0..90.0)),
        bms: Some(rng.gen_range(20.0..90.0)),
        orb_40: Some(reb_g * 0.35 * 40.0 / min_g.max(1.0)),
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, base: f64, spread: f64) -> f64 {
    (base + rng.gen_range(-spread..spread)).max(0.0)
}

fn resolve_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CEREBRO_DB_PATH") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    store::default_db_path().context("unable to resolve sqlite path")
}
