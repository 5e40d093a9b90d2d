use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::llm::TextGenerator;
use crate::prompts;
use crate::store;

pub const DEFAULT_TOP_LIMIT: usize = 10;
pub const DEFAULT_MIN_GAMES: i64 = 5;

static REPORT_INTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(report|scouting report|scout report|write up|write-up|player report)\b")
        .expect("report intent regex")
});

static RANKING_INTENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(best|top|most|highest|leaders?)\b").expect("ranking regex"));

static COMPOSITE_INTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(effective|efficient|impactful|complete|well[- ]rounded)\b")
        .expect("composite regex")
});

static TOP_N_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btop\s+(\d{1,2})\b").expect("top n regex"));

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("fenced json regex")
});

/// Position synonyms, most specific first so "power forward" never
/// canonicalizes to F via the bare "forward" pattern.
static POSITION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b(point guards?|pg)\b", "PG"),
        (r"(?i)\b(shooting guards?|sg)\b", "SG"),
        (r"(?i)\b(small forwards?|sf)\b", "SF"),
        (r"(?i)\b(power forwards?|pf)\b", "PF"),
        (r"(?i)\b(centers?|centres?|big men|bigs)\b", "C"),
        (r"(?i)\bc\b", "C"),
        (r"(?i)\bguards?\b", "G"),
        (r"(?i)\bforwards?\b", "F"),
    ]
    .into_iter()
    .map(|(pattern, pos)| (Regex::new(pattern).expect("position regex"), pos))
    .collect()
});

const METRIC_KEYWORDS: &[(&str, &str)] = &[
    ("points", "pts_g"),
    ("scoring", "pts_g"),
    ("scorers", "pts_g"),
    ("scorer", "pts_g"),
    ("ppg", "pts_g"),
    ("rebounds", "reb_g"),
    ("rebounding", "reb_g"),
    ("rebounders", "reb_g"),
    ("boards", "reb_g"),
    ("rpg", "reb_g"),
    ("assists", "ast_g"),
    ("dimes", "ast_g"),
    ("playmakers", "ast_g"),
    ("apg", "ast_g"),
    ("steals", "stl_g"),
    ("spg", "stl_g"),
    ("blocks", "blk_g"),
    ("shot blockers", "blk_g"),
    ("bpg", "blk_g"),
    ("field goal", "fg"),
    ("fg%", "fg"),
    ("three point", "c_3pt"),
    ("three-point", "c_3pt"),
    ("3pt", "c_3pt"),
    ("3-point", "c_3pt"),
    ("threes", "c_3pt"),
    ("free throw", "ft"),
    ("ft%", "ft"),
    ("usage", "usg"),
];

const EFFICIENCY_KEYWORDS: &[(&str, &str)] = &[
    ("true shooting", "ts"),
    ("ts%", "ts"),
    ("effective field goal", "efg"),
    ("efg", "efg"),
    ("points per possession", "ppp"),
    ("ppp", "ppp"),
    ("assist to turnover", "a_to"),
    ("assist-to-turnover", "a_to"),
    ("ast/to", "a_to"),
    ("a/to", "a_to"),
];

/// The classifier's decision, consumed by the tool dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPlan {
    SearchPlayers {
        query: String,
        team: String,
        position: String,
        limit: usize,
    },
    GetPlayerById {
        id: String,
    },
    TopPlayers {
        metric: String,
        position: String,
        team: String,
        limit: usize,
        min_games: i64,
    },
    TopPlayersByPosition {
        position: String,
        team: String,
        focus_metric: Option<String>,
        limit: usize,
        min_games: i64,
    },
    None,
}

impl ToolPlan {
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolPlan::SearchPlayers { .. } => "search_players",
            ToolPlan::GetPlayerById { .. } => "get_player_by_id",
            ToolPlan::TopPlayers { .. } => "top_players",
            ToolPlan::TopPlayersByPosition { .. } => "top_players_by_position",
            ToolPlan::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTarget {
    pub player_name: String,
    pub team: String,
    pub position: String,
}

pub fn report_intent(message: &str) -> bool {
    REPORT_INTENT_RE.is_match(message)
}

pub fn canonical_position(message: &str) -> Option<&'static str> {
    POSITION_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(message))
        .map(|(_, pos)| *pos)
}

pub fn metric_from_keywords(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    // Efficiency phrasings first: "effective field goal" must not be
    // claimed by the plain "field goal" entry.
    EFFICIENCY_KEYWORDS
        .iter()
        .chain(METRIC_KEYWORDS.iter())
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, metric)| *metric)
}

fn requested_count(message: &str) -> Option<usize> {
    TOP_N_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

/// "Top N <metric> at <position>" detector. Position, ranking word, and
/// metric must all resolve or the detector yields nothing.
pub fn detect_top_by_metric(message: &str) -> Option<ToolPlan> {
    let position = canonical_position(message)?;
    if !RANKING_INTENT_RE.is_match(message) {
        return None;
    }
    let metric = metric_from_keywords(message)?;
    Some(ToolPlan::TopPlayers {
        metric: metric.to_string(),
        position: position.to_string(),
        team: String::new(),
        limit: requested_count(message).unwrap_or(DEFAULT_TOP_LIMIT),
        min_games: DEFAULT_MIN_GAMES,
    })
}

/// "Most effective/efficient/impactful <position>" detector. No explicit
/// metric required; a metric keyword, if present, becomes the focus.
pub fn detect_top_by_position(message: &str) -> Option<ToolPlan> {
    let position = canonical_position(message)?;
    if !COMPOSITE_INTENT_RE.is_match(message) {
        return None;
    }
    Some(ToolPlan::TopPlayersByPosition {
        position: position.to_string(),
        team: String::new(),
        focus_metric: metric_from_keywords(message).map(str::to_string),
        limit: requested_count(message).unwrap_or(DEFAULT_TOP_LIMIT),
        min_games: DEFAULT_MIN_GAMES,
    })
}

/// Heuristic layer of the classifier: cheapest, most certain checks
/// first; `None` hands the utterance to the LLM router.
pub fn detect_heuristic_plan(message: &str) -> Option<ToolPlan> {
    detect_top_by_metric(message).or_else(|| detect_top_by_position(message))
}

/// Parse a model reply as JSON: direct parse first, then the first
/// fenced code block.
pub fn parse_model_json(raw: &str) -> Result<Value> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return Err(anyhow!("empty model reply"));
    }
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }
    let block = FENCED_JSON_RE
        .captures(cleaned)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| anyhow!("model reply is not JSON and has no fenced block"))?;
    serde_json::from_str(block.as_str().trim()).context("decode fenced model JSON")
}

/// Decode a `{tool, args}` reply into a plan. An explicit fallible step;
/// callers default to `ToolPlan::None` on error.
pub fn parse_tool_plan(raw: &str) -> Result<ToolPlan> {
    let value = parse_model_json(raw)?;
    let tool = value
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("model plan missing tool field"))?;
    let args = value.get("args").cloned().unwrap_or(Value::Null);

    let plan = match tool {
        "search_players" => ToolPlan::SearchPlayers {
            query: arg_str(&args, &["query", "name", "playerName"]),
            team: arg_str(&args, &["team"]),
            position: arg_str(&args, &["position"]),
            limit: arg_usize(&args, "limit").unwrap_or(store::DEFAULT_SEARCH_LIMIT),
        },
        "get_player_by_id" => {
            let id = arg_str(&args, &["id", "playerId", "unique_id"]);
            if id.is_empty() {
                return Err(anyhow!("get_player_by_id plan missing id"));
            }
            ToolPlan::GetPlayerById { id }
        }
        "top_players" => ToolPlan::TopPlayers {
            metric: {
                let metric = arg_str(&args, &["metric"]);
                if metric.is_empty() { "pts_g".to_string() } else { metric }
            },
            position: arg_str(&args, &["position"]),
            team: arg_str(&args, &["team"]),
            limit: arg_usize(&args, "limit").unwrap_or(DEFAULT_TOP_LIMIT),
            min_games: arg_i64(&args, "minGames").unwrap_or(DEFAULT_MIN_GAMES),
        },
        "top_players_by_position" => ToolPlan::TopPlayersByPosition {
            position: arg_str(&args, &["position"]),
            team: arg_str(&args, &["team"]),
            focus_metric: {
                let metric = arg_str(&args, &["metric", "focusMetric"]);
                if metric.is_empty() { None } else { Some(metric) }
            },
            limit: arg_usize(&args, "limit").unwrap_or(DEFAULT_TOP_LIMIT),
            min_games: arg_i64(&args, "minGames").unwrap_or(DEFAULT_MIN_GAMES),
        },
        "none" => ToolPlan::None,
        other => return Err(anyhow!("model plan names unknown tool '{other}'")),
    };
    Ok(plan)
}

/// Delegate an utterance to the LLM router. Any malformed output
/// degrades to `ToolPlan::None`, never an error past this layer.
pub fn decide_tool_plan(generator: &dyn TextGenerator, message: &str) -> ToolPlan {
    let raw = match generator.generate(&prompts::router_prompt(message)) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("[agent] router call failed: {err}");
            return ToolPlan::None;
        }
    };
    match parse_tool_plan(&raw) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("[agent] router reply unusable: {err}");
            ToolPlan::None
        }
    }
}

/// Secondary extraction call: pull `{playerName, team, position}` out of
/// the message. `None` when the model finds nothing usable.
pub fn extract_report_target(
    generator: &dyn TextGenerator,
    message: &str,
) -> Option<ReportTarget> {
    if message.trim().is_empty() {
        return None;
    }
    let raw = generator.generate(&prompts::extraction_prompt(message)).ok()?;
    let value = parse_model_json(&raw).ok()?;
    if !value.is_object() {
        return None;
    }
    Some(ReportTarget {
        player_name: field_str(&value, "playerName"),
        team: field_str(&value, "team"),
        position: field_str(&value, "position"),
    })
}

fn field_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn arg_str(args: &Value, keys: &[&str]) -> String {
    for key in keys {
        if let Some(s) = args.get(key).and_then(Value::as_str) {
            let s = s.trim();
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    String::new()
}

fn arg_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .filter(|n| *n > 0)
}

fn arg_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::{
        ToolPlan, canonical_position, detect_heuristic_plan, metric_from_keywords,
        parse_model_json, parse_tool_plan, report_intent,
    };

    #[test]
    fn report_regex_matches_variants() {
        assert!(report_intent("write me a scouting report for Jane Doe"));
        assert!(report_intent("can I get a write-up on this guy"));
        assert!(!report_intent("who leads the league in steals"));
    }

    #[test]
    fn positions_prefer_specific_synonyms() {
        assert_eq!(canonical_position("best power forward tonight"), Some("PF"));
        assert_eq!(canonical_position("top forwards"), Some("F"));
        assert_eq!(canonical_position("who is the best PG"), Some("PG"));
        assert_eq!(canonical_position("strongest centres"), Some("C"));
        assert_eq!(canonical_position("fastest players"), None);
    }

    #[test]
    fn efficiency_sub_detector_resolves() {
        assert_eq!(metric_from_keywords("highest true shooting guards"), Some("ts"));
        assert_eq!(metric_from_keywords("points per possession leaders"), Some("ppp"));
        assert_eq!(metric_from_keywords("best effective field goal bigs"), Some("efg"));
        assert_eq!(metric_from_keywords("top field goal shooters"), Some("fg"));
        assert_eq!(metric_from_keywords("who dunks hardest"), None);
    }

    #[test]
    fn best_pg_by_assists_routes_without_llm() {
        let plan = detect_heuristic_plan("who is the best PG by assists").expect("plan expected");
        match plan {
            ToolPlan::TopPlayers { metric, position, .. } => {
                assert_eq!(metric, "ast_g");
                assert_eq!(position, "PG");
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn composite_detector_needs_no_metric() {
        let plan =
            detect_heuristic_plan("most effective centers this season").expect("plan expected");
        match plan {
            ToolPlan::TopPlayersByPosition { position, focus_metric, .. } => {
                assert_eq!(position, "C");
                assert_eq!(focus_metric, None);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn fenced_json_fallback_parses() {
        let raw = "Sure, here you go:\n```json\n{\"tool\":\"none\"}\n```";
        assert_eq!(
            parse_model_json(raw).expect("fenced block should parse")["tool"],
            "none"
        );
    }

    #[test]
    fn malformed_plan_is_an_error_not_a_panic() {
        assert!(parse_tool_plan("complete nonsense").is_err());
        assert!(parse_tool_plan("{\"args\":{}}").is_err());
        assert!(parse_tool_plan("{\"tool\":\"launch_rockets\"}").is_err());
    }

    #[test]
    fn search_plan_accepts_name_aliases() {
        let plan = parse_tool_plan(
            "{\"tool\":\"search_players\",\"args\":{\"playerName\":\"Jane Doe\"}}",
        )
        .expect("plan should parse");
        match plan {
            ToolPlan::SearchPlayers { query, .. } => assert_eq!(query, "Jane Doe"),
            other => panic!("unexpected plan {other:?}"),
        }
    }
}
