use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

/// Metrics callers may order or rank by. Anything else falls back to
/// `pts_g` and never reaches SQL.
pub const METRIC_ALLOWLIST: &[&str] = &[
    "pts_g", "reb_g", "ast_g", "stl_g", "blk_g", "fg", "c_3pt", "ft", "efg", "ts", "usg", "ppp",
    "a_to", "orb_40", "ram", "c_ram", "psp", "c_3pe", "dsi", "fgs", "bms",
];

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;
const MAX_POOL_LIMIT: usize = 500;

const PLAYER_COLUMNS: &str = "unique_id, name, team, position, league, class, \
     pts_g, reb_g, ast_g, fg, c_3pt, ft, stl_g, blk_g, to_g, \
     min_g, g, c_2pt, efg, ts, usg, ppp, orb_g, drb_g, pf_g, a_to, \
     ram, c_ram, psp, c_3pe, dsi, fgs, bms, orb_40";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PlayerRow {
    pub unique_id: String,
    pub name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub league: Option<String>,
    pub class: Option<String>,
    pub pts_g: Option<f64>,
    pub reb_g: Option<f64>,
    pub ast_g: Option<f64>,
    pub fg: Option<f64>,
    pub c_3pt: Option<f64>,
    pub ft: Option<f64>,
    pub stl_g: Option<f64>,
    pub blk_g: Option<f64>,
    pub to_g: Option<f64>,
    pub min_g: Option<f64>,
    pub g: Option<i64>,
    pub c_2pt: Option<f64>,
    pub efg: Option<f64>,
    pub ts: Option<f64>,
    pub usg: Option<f64>,
    pub ppp: Option<f64>,
    pub orb_g: Option<f64>,
    pub drb_g: Option<f64>,
    pub pf_g: Option<f64>,
    pub a_to: Option<f64>,
    pub ram: Option<f64>,
    pub c_ram: Option<f64>,
    pub psp: Option<f64>,
    pub c_3pe: Option<f64>,
    pub dsi: Option<f64>,
    pub fgs: Option<f64>,
    pub bms: Option<f64>,
    pub orb_40: Option<f64>,
}

impl PlayerRow {
    /// Value of an allow-listed metric on this row.
    pub fn metric_value(&self, metric: &str) -> Option<f64> {
        match metric {
            "pts_g" => self.pts_g,
            "reb_g" => self.reb_g,
            "ast_g" => self.ast_g,
            "stl_g" => self.stl_g,
            "blk_g" => self.blk_g,
            "fg" => self.fg,
            "c_3pt" => self.c_3pt,
            "ft" => self.ft,
            "efg" => self.efg,
            "ts" => self.ts,
            "usg" => self.usg,
            "ppp" => self.ppp,
            "a_to" => self.a_to,
            "orb_40" => self.orb_40,
            "ram" => self.ram,
            "c_ram" => self.c_ram,
            "psp" => self.psp,
            "c_3pe" => self.c_3pe,
            "dsi" => self.dsi,
            "fgs" => self.fgs,
            "bms" => self.bms,
            _ => None,
        }
    }

    pub fn as_candidate(&self) -> CandidateMatch {
        CandidateMatch {
            unique_id: self.unique_id.clone(),
            name: self.name.clone(),
            team: self.team.clone(),
            position: self.position.clone(),
            class: self.class.clone(),
            league: self.league.clone(),
            similarity_score: None,
        }
    }
}

/// Projection returned by name/team/position filters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CandidateMatch {
    pub unique_id: String,
    pub name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub class: Option<String>,
    pub league: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub query: String,
    pub team: String,
    pub position: String,
    pub limit: usize,
}

pub fn sanitize_metric(metric: &str) -> &'static str {
    METRIC_ALLOWLIST
        .iter()
        .copied()
        .find(|m| *m == metric)
        .unwrap_or("pts_g")
}

pub fn clamp_limit(limit: usize) -> usize {
    if limit == 0 {
        return DEFAULT_SEARCH_LIMIT;
    }
    limit.clamp(1, MAX_SEARCH_LIMIT)
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("players.sqlite"))
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join("cerebro_scout"));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("cerebro_scout"),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS players (
            unique_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            team TEXT NULL,
            position TEXT NULL,
            league TEXT NULL,
            class TEXT NULL,
            pts_g REAL NULL,
            reb_g REAL NULL,
            ast_g REAL NULL,
            fg REAL NULL,
            c_3pt REAL NULL,
            ft REAL NULL,
            stl_g REAL NULL,
            blk_g REAL NULL,
            to_g REAL NULL,
            min_g REAL NULL,
            g INTEGER NULL,
            c_2pt REAL NULL,
            efg REAL NULL,
            ts REAL NULL,
            usg REAL NULL,
            ppp REAL NULL,
            orb_g REAL NULL,
            drb_g REAL NULL,
            pf_g REAL NULL,
            a_to REAL NULL,
            ram REAL NULL,
            c_ram REAL NULL,
            psp REAL NULL,
            c_3pe REAL NULL,
            dsi REAL NULL,
            fgs REAL NULL,
            bms REAL NULL,
            orb_40 REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_name ON players(name);
        CREATE INDEX IF NOT EXISTS idx_players_team ON players(team);
        CREATE INDEX IF NOT EXISTS idx_players_position ON players(position);
        CREATE INDEX IF NOT EXISTS idx_players_games ON players(g);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Substring search over player names, optionally narrowed by team and
/// position. SQLite LIKE is case-insensitive for ASCII, so this behaves
/// like an ILIKE filter.
pub fn search_players(conn: &Connection, filter: &SearchFilter) -> Result<Vec<CandidateMatch>> {
    let limit = clamp_limit(filter.limit);
    let mut sql = String::from(
        "SELECT unique_id, name, team, position, class, league FROM players \
         WHERE name IS NOT NULL AND name <> ''",
    );
    let mut args: Vec<String> = Vec::new();
    if !filter.query.is_empty() {
        args.push(format!("%{}%", filter.query));
        sql.push_str(&format!(" AND name LIKE ?{}", args.len()));
    }
    if !filter.team.is_empty() {
        args.push(format!("%{}%", filter.team));
        sql.push_str(&format!(" AND team LIKE ?{}", args.len()));
    }
    if !filter.position.is_empty() {
        args.push(format!("%{}%", filter.position));
        sql.push_str(&format!(" AND position LIKE ?{}", args.len()));
    }
    sql.push_str(&format!(" LIMIT {limit}"));

    let mut stmt = conn.prepare(&sql).context("prepare player search query")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok(CandidateMatch {
                unique_id: row.get(0)?,
                name: row.get(1)?,
                team: row.get(2)?,
                position: row.get(3)?,
                class: row.get(4)?,
                league: row.get(5)?,
                similarity_score: None,
            })
        })
        .context("query player search")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode candidate row")?);
    }
    Ok(out)
}

/// Single-record fetch. `Ok(None)` means no such player; callers decide
/// whether that is an error.
pub fn get_player(conn: &Connection, id: &str) -> Result<Option<PlayerRow>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE unique_id = ?1 LIMIT 1");
    let mut stmt = conn.prepare(&sql).context("prepare player fetch query")?;
    let mut rows = stmt
        .query_map(params![id], decode_player_row)
        .context("query player fetch")?;
    match rows.next() {
        Some(row) => Ok(Some(row.context("decode player row")?)),
        None => Ok(None),
    }
}

/// Top players ordered descending by an allow-listed metric. Rows with a
/// NULL metric sort last.
pub fn top_players_by_metric(
    conn: &Connection,
    metric: &str,
    position: &str,
    team: &str,
    limit: usize,
    min_games: i64,
) -> Result<Vec<PlayerRow>> {
    query_players_ordered(conn, metric, position, team, clamp_limit(limit), min_games)
}

/// Broader candidate pool for composite ranking, ordered by scoring so a
/// truncated pool still keeps the high-usage names.
pub fn candidate_pool(
    conn: &Connection,
    position: &str,
    team: &str,
    pool_limit: usize,
    min_games: i64,
) -> Result<Vec<PlayerRow>> {
    let limit = pool_limit.clamp(1, MAX_POOL_LIMIT);
    query_players_ordered(conn, "pts_g", position, team, limit, min_games)
}

fn query_players_ordered(
    conn: &Connection,
    metric: &str,
    position: &str,
    team: &str,
    limit: usize,
    min_games: i64,
) -> Result<Vec<PlayerRow>> {
    let metric = sanitize_metric(metric);
    let mut sql = format!(
        "SELECT {PLAYER_COLUMNS} FROM players \
         WHERE name IS NOT NULL AND name <> '' AND g >= ?1",
    );
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(min_games)];
    if !position.is_empty() {
        args.push(Box::new(format!("%{position}%")));
        sql.push_str(&format!(" AND position LIKE ?{}", args.len()));
    }
    if !team.is_empty() {
        args.push(Box::new(format!("%{team}%")));
        sql.push_str(&format!(" AND team LIKE ?{}", args.len()));
    }
    sql.push_str(&format!(
        " ORDER BY {metric} IS NULL, {metric} DESC LIMIT {limit}"
    ));

    let mut stmt = conn.prepare(&sql).context("prepare top players query")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), decode_player_row)
        .context("query top players")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player row")?);
    }
    Ok(out)
}

/// All finite values of one allow-listed metric across players with at
/// least `min_games` games. Percentile input.
pub fn metric_values(conn: &Connection, metric: &str, min_games: i64) -> Result<Vec<f64>> {
    let metric = sanitize_metric(metric);
    let sql = format!(
        "SELECT {metric} FROM players \
         WHERE name IS NOT NULL AND name <> '' AND g >= ?1 AND {metric} IS NOT NULL"
    );
    let mut stmt = conn.prepare(&sql).context("prepare metric values query")?;
    let rows = stmt
        .query_map(params![min_games], |row| row.get::<_, f64>(0))
        .context("query metric values")?;

    let mut out = Vec::new();
    for row in rows {
        let value = row.context("decode metric value")?;
        if value.is_finite() {
            out.push(value);
        }
    }
    Ok(out)
}

pub fn upsert_player(conn: &Connection, player: &PlayerRow) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO players (
            unique_id, name, team, position, league, class,
            pts_g, reb_g, ast_g, fg, c_3pt, ft, stl_g, blk_g, to_g,
            min_g, g, c_2pt, efg, ts, usg, ppp, orb_g, drb_g, pf_g, a_to,
            ram, c_ram, psp, c_3pe, dsi, fgs, bms, orb_40
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
            ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34
        )
        ON CONFLICT(unique_id) DO UPDATE SET
            name = excluded.name,
            team = excluded.team,
            position = excluded.position,
            league = excluded.league,
            class = excluded.class,
            pts_g = excluded.pts_g,
            reb_g = excluded.reb_g,
            ast_g = excluded.ast_g,
            fg = excluded.fg,
            c_3pt = excluded.c_3pt,
            ft = excluded.ft,
            stl_g = excluded.stl_g,
            blk_g = excluded.blk_g,
            to_g = excluded.to_g,
            min_g = excluded.min_g,
            g = excluded.g,
            c_2pt = excluded.c_2pt,
            efg = excluded.efg,
            ts = excluded.ts,
            usg = excluded.usg,
            ppp = excluded.ppp,
            orb_g = excluded.orb_g,
            drb_g = excluded.drb_g,
            pf_g = excluded.pf_g,
            a_to = excluded.a_to,
            ram = excluded.ram,
            c_ram = excluded.c_ram,
            psp = excluded.psp,
            c_3pe = excluded.c_3pe,
            dsi = excluded.dsi,
            fgs = excluded.fgs,
            bms = excluded.bms,
            orb_40 = excluded.orb_40
        "#,
        params![
            player.unique_id,
            player.name,
            player.team,
            player.position,
            player.league,
            player.class,
            player.pts_g,
            player.reb_g,
            player.ast_g,
            player.fg,
            player.c_3pt,
            player.ft,
            player.stl_g,
            player.blk_g,
            player.to_g,
            player.min_g,
            player.g,
            player.c_2pt,
            player.efg,
            player.ts,
            player.usg,
            player.ppp,
            player.orb_g,
            player.drb_g,
            player.pf_g,
            player.a_to,
            player.ram,
            player.c_ram,
            player.psp,
            player.c_3pe,
            player.dsi,
            player.fgs,
            player.bms,
            player.orb_40,
        ],
    )
    .context("upsert player row")?;
    Ok(())
}

fn decode_player_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerRow> {
    Ok(PlayerRow {
        unique_id: row.get(0)?,
        name: row.get(1)?,
        team: row.get(2)?,
        position: row.get(3)?,
        league: row.get(4)?,
        class: row.get(5)?,
        pts_g: row.get(6)?,
        reb_g: row.get(7)?,
        ast_g: row.get(8)?,
        fg: row.get(9)?,
        c_3pt: row.get(10)?,
        ft: row.get(11)?,
        stl_g: row.get(12)?,
        blk_g: row.get(13)?,
        to_g: row.get(14)?,
        min_g: row.get(15)?,
        g: row.get(16)?,
        c_2pt: row.get(17)?,
        efg: row.get(18)?,
        ts: row.get(19)?,
        usg: row.get(20)?,
        ppp: row.get(21)?,
        orb_g: row.get(22)?,
        drb_g: row.get(23)?,
        pf_g: row.get(24)?,
        a_to: row.get(25)?,
        ram: row.get(26)?,
        c_ram: row.get(27)?,
        psp: row.get(28)?,
        c_3pe: row.get(29)?,
        dsi: row.get(30)?,
        fgs: row.get(31)?,
        bms: row.get(32)?,
        orb_40: row.get(33)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{clamp_limit, sanitize_metric};

    #[test]
    fn sanitize_metric_falls_back_to_points() {
        assert_eq!(sanitize_metric("ast_g"), "ast_g");
        assert_eq!(sanitize_metric("pts_g; DROP TABLE players"), "pts_g");
        assert_eq!(sanitize_metric(""), "pts_g");
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(0), 20);
        assert_eq!(clamp_limit(7), 7);
        assert_eq!(clamp_limit(1000), 100);
    }
}
