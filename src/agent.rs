use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::intent::{self, ReportTarget, ToolPlan};
use crate::llm::TextGenerator;
use crate::prompts;
use crate::rankings;
use crate::resolve::{self, Resolution, normalize_name};
use crate::session::SessionMemory;
use crate::store::{self, CandidateMatch, SearchFilter};
use crate::thresholds;

const REPORT_SEARCH_LIMIT: usize = 10;
const PROVIDED_PLAYER_SEARCH_LIMIT: usize = 5;

static PRONOUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(that player|this player|he|him|his|she|her|they|them)\b")
        .expect("pronoun regex")
});

/// A player reference supplied directly by the caller instead of being
/// extracted from the message.
#[derive(Debug, Clone, Default)]
pub struct ProvidedPlayer {
    pub unique_id: String,
    pub name: String,
    pub team: String,
    pub position: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub message: String,
    pub player_id: String,
    pub player: Option<ProvidedPlayer>,
}

#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub tool_used: String,
    pub evidence: Value,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub report: String,
    pub tool_used: String,
    pub evidence: Value,
}

/// Stateless orchestration over the store, the generator, and the two
/// process-wide caches. One instance per process is the expected shape.
pub struct Agent<'a> {
    conn: &'a Connection,
    generator: &'a dyn TextGenerator,
    sessions: &'a SessionMemory,
    thresholds_path: PathBuf,
}

impl<'a> Agent<'a> {
    pub fn new(
        conn: &'a Connection,
        generator: &'a dyn TextGenerator,
        sessions: &'a SessionMemory,
        thresholds_path: PathBuf,
    ) -> Self {
        Self {
            conn,
            generator,
            sessions,
            thresholds_path,
        }
    }

    /// Chat entry point: classify the message, run the chosen tool,
    /// surface ambiguity as a clarification, otherwise generate a reply
    /// grounded in the tool result.
    pub fn run_chat(&self, message: &str, session_id: &str) -> Result<ChatOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(anyhow!("message is required"));
        }

        if intent::report_intent(message) {
            let delegated = self.run_report(&ReportRequest {
                message: message.to_string(),
                ..ReportRequest::default()
            })?;
            return Ok(ChatOutcome {
                reply: delegated.report,
                tool_used: format!("chat->report:{}", delegated.tool_used),
                evidence: delegated.evidence,
            });
        }

        let mut plan = match intent::detect_heuristic_plan(message) {
            Some(plan) => plan,
            None => intent::decide_tool_plan(self.generator, message),
        };
        if plan == ToolPlan::None {
            if let Some(target) = intent::extract_report_target(self.generator, message) {
                if !target.player_name.is_empty() {
                    plan = ToolPlan::SearchPlayers {
                        query: target.player_name,
                        team: target.team,
                        position: target.position,
                        limit: store::DEFAULT_SEARCH_LIMIT,
                    };
                }
            }
        }
        if plan == ToolPlan::None {
            if let Some(remembered) = self.pronoun_reference(message, session_id) {
                plan = ToolPlan::GetPlayerById {
                    id: remembered.unique_id,
                };
            }
        }
        log_tool_invocation("plan_selected", &json!({ "tool": plan.tool_name() }));

        let outcome = match &plan {
            ToolPlan::SearchPlayers {
                query,
                team,
                position,
                limit,
            } => self.resolve_search_for_chat(query, team, position, *limit, session_id)?,
            other => self.run_tool_plan(other)?,
        };

        if let Some(reply) = clarification_reply(&outcome) {
            return Ok(ChatOutcome {
                reply,
                tool_used: outcome.tool,
                evidence: outcome.result,
            });
        }

        // Direct id fetches count as a resolved turn too.
        if !session_id.is_empty() && outcome.tool == "get_player_by_id" {
            if let Ok(player) = serde_json::from_value::<store::PlayerRow>(outcome.result.clone()) {
                self.sessions.set(session_id, &player.as_candidate());
            }
        }

        let reply = self
            .generator
            .generate(&prompts::chat_reply_prompt(message, &outcome.tool, &outcome.result))
            .context("chat reply generation failed")?;

        let resolved_name = outcome
            .result
            .get("resolved_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let original_query = outcome
            .result
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let reply = if !resolved_name.is_empty()
            && !original_query.is_empty()
            && normalize_name(resolved_name) != normalize_name(original_query)
        {
            format!("I used \"{resolved_name}\" as the closest matching player name.\n\n{reply}")
        } else {
            reply
        };

        Ok(ChatOutcome {
            reply,
            tool_used: outcome.tool,
            evidence: outcome.result,
        })
    }

    /// Report entry point. Resolution priority: explicit id, provided
    /// player struct, name extracted from the message, then a routed or
    /// default top-players cohort.
    pub fn run_report(&self, request: &ReportRequest) -> Result<ReportOutcome> {
        let message = request.message.trim();
        let provided_id = request
            .player
            .as_ref()
            .map(|p| p.unique_id.as_str())
            .filter(|id| !id.is_empty())
            .unwrap_or(request.player_id.trim());
        let named_player = request.player.as_ref().filter(|p| !p.name.is_empty());

        if message.is_empty() && provided_id.is_empty() && named_player.is_none() {
            return Err(anyhow!("message, player, or playerId is required"));
        }

        let (tool_used, evidence) = if !provided_id.is_empty() {
            log_tool_invocation("get_player_by_id", &json!({ "id": provided_id }));
            let player = store::get_player(self.conn, provided_id)?
                .ok_or_else(|| anyhow!("player '{provided_id}' not found"))?;
            ("get_player_by_id".to_string(), json!({ "player": player }))
        } else if let Some(provided) = named_player {
            let filter = SearchFilter {
                query: provided.name.clone(),
                team: provided.team.clone(),
                position: provided.position.clone(),
                limit: PROVIDED_PLAYER_SEARCH_LIMIT,
            };
            log_tool_invocation(
                "search_players",
                &json!({ "query": filter.query, "team": filter.team, "position": filter.position }),
            );
            let matches = store::search_players(self.conn, &filter)?;
            (
                "search_players".to_string(),
                json!({
                    "provided_player": {
                        "name": provided.name,
                        "team": provided.team,
                        "position": provided.position,
                    },
                    "matches": matches,
                }),
            )
        } else {
            self.report_evidence_from_message(message)?
        };

        let report = self
            .generator
            .generate(&prompts::report_prompt(message, &evidence))
            .context("report generation failed")?;
        Ok(ReportOutcome {
            report,
            tool_used,
            evidence,
        })
    }

    /// Execute the concrete data operation a plan names. The chat path
    /// routes searches through `resolve_search_for_chat` instead so
    /// ambiguity is surfaced; this direct form backs the report path.
    pub fn run_tool_plan(&self, plan: &ToolPlan) -> Result<ToolOutcome> {
        match plan {
            ToolPlan::SearchPlayers {
                query,
                team,
                position,
                limit,
            } => {
                let filter = SearchFilter {
                    query: query.clone(),
                    team: team.clone(),
                    position: position.clone(),
                    limit: *limit,
                };
                log_tool_invocation(
                    "search_players",
                    &json!({ "query": query, "team": team, "position": position, "limit": limit }),
                );
                let players = store::search_players(self.conn, &filter)?;
                Ok(ToolOutcome {
                    tool: "search_players".to_string(),
                    result: json!(players),
                })
            }
            ToolPlan::GetPlayerById { id } => {
                log_tool_invocation("get_player_by_id", &json!({ "id": id }));
                let player = store::get_player(self.conn, id)?
                    .ok_or_else(|| anyhow!("player '{id}' not found"))?;
                Ok(ToolOutcome {
                    tool: "get_player_by_id".to_string(),
                    result: json!(player),
                })
            }
            ToolPlan::TopPlayers {
                metric,
                position,
                team,
                limit,
                min_games,
            } => {
                let safe_metric = store::sanitize_metric(metric);
                log_tool_invocation(
                    "top_players",
                    &json!({
                        "metric": safe_metric, "position": position, "team": team,
                        "limit": limit, "min_games": min_games,
                    }),
                );
                let players = store::top_players_by_metric(
                    self.conn, safe_metric, position, team, *limit, *min_games,
                )?;
                Ok(ToolOutcome {
                    tool: "top_players".to_string(),
                    result: json!({ "metric": safe_metric, "players": players }),
                })
            }
            ToolPlan::TopPlayersByPosition {
                position,
                team,
                focus_metric,
                limit,
                min_games,
            } => {
                log_tool_invocation(
                    "top_players_by_position",
                    &json!({
                        "position": position, "team": team, "focus_metric": focus_metric,
                        "limit": limit, "min_games": min_games,
                    }),
                );
                let now_secs = chrono::Utc::now().timestamp().max(0) as u64;
                let cache = thresholds::get_thresholds(
                    self.conn,
                    &self.thresholds_path,
                    *min_games,
                    now_secs,
                )?;
                let players = rankings::top_players_by_position(
                    self.conn,
                    &cache,
                    position,
                    team,
                    focus_metric.as_deref(),
                    *limit,
                    *min_games,
                )?;
                Ok(ToolOutcome {
                    tool: "top_players_by_position".to_string(),
                    result: json!({
                        "position": position,
                        "focus_metric": focus_metric,
                        "percentile": cache.percentile,
                        "players": players,
                    }),
                })
            }
            ToolPlan::None => Ok(ToolOutcome {
                tool: "none".to_string(),
                result: Value::Null,
            }),
        }
    }

    /// Chat-path search: resolve through disambiguation, remember the
    /// resolved player for the session, and shape the evidence so the
    /// reply prompt can cite the resolution.
    fn resolve_search_for_chat(
        &self,
        query: &str,
        team: &str,
        position: &str,
        limit: usize,
        session_id: &str,
    ) -> Result<ToolOutcome> {
        log_tool_invocation(
            "search_players",
            &json!({ "query": query, "team": team, "position": position, "limit": limit }),
        );
        let resolution = resolve::resolve_player(self.conn, query, team, position, limit)?;

        if let (Some(player), false) = (resolution.resolved_player(), session_id.is_empty()) {
            self.sessions.set(session_id, &player.as_candidate());
        }

        let outcome = match resolution {
            Resolution::Exact {
                query,
                best_match,
                player,
                candidates,
            } => ToolOutcome {
                tool: "search_players+get_player_by_id".to_string(),
                result: json!({
                    "query": query,
                    "best_match": best_match,
                    "resolution": "exact",
                    "resolved_name": player.name.clone(),
                    "player": player,
                    "candidate_matches": candidates,
                }),
            },
            Resolution::SingleCandidate {
                query,
                best_match,
                player,
            } => ToolOutcome {
                tool: "search_players+get_player_by_id".to_string(),
                result: json!({
                    "query": query,
                    "best_match": best_match,
                    "resolution": "single_candidate",
                    "resolved_name": player.name.clone(),
                    "player": player,
                }),
            },
            Resolution::FuzzySingle {
                query,
                best_match,
                player,
                candidates,
            } => ToolOutcome {
                tool: "search_players+get_player_by_id".to_string(),
                result: json!({
                    "query": query,
                    "best_match": best_match,
                    "resolution": "fuzzy_single",
                    "resolved_name": player.name.clone(),
                    "player": player,
                    "candidate_matches": candidates,
                }),
            },
            Resolution::DuplicateExactName { query, candidates } => ToolOutcome {
                tool: "search_players".to_string(),
                result: json!({
                    "query": query,
                    "ambiguity": "duplicate_exact_name",
                    "candidates": candidates,
                }),
            },
            Resolution::SimilarNameCandidates { query, candidates } => ToolOutcome {
                tool: "search_players".to_string(),
                result: json!({
                    "query": query,
                    "ambiguity": "similar_name_candidates",
                    "candidates": candidates,
                }),
            },
            Resolution::NoMatch { matches, .. } => ToolOutcome {
                tool: "search_players".to_string(),
                result: json!(matches),
            },
        };
        Ok(outcome)
    }

    /// Report path when only a message is available: extraction, then
    /// best-match search, then a routed or default cohort.
    fn report_evidence_from_message(&self, message: &str) -> Result<(String, Value)> {
        if let Some(target) = intent::extract_report_target(self.generator, message) {
            if !target.player_name.is_empty() {
                return self.report_evidence_from_target(&target);
            }
        }

        let plan = match intent::decide_tool_plan(self.generator, message) {
            ToolPlan::None => ToolPlan::TopPlayers {
                metric: "pts_g".to_string(),
                position: String::new(),
                team: String::new(),
                limit: intent::DEFAULT_TOP_LIMIT,
                min_games: intent::DEFAULT_MIN_GAMES,
            },
            plan => plan,
        };
        let outcome = self.run_tool_plan(&plan)?;
        Ok((
            outcome.tool,
            json!({ "user_request": message, "result": outcome.result }),
        ))
    }

    fn report_evidence_from_target(&self, target: &ReportTarget) -> Result<(String, Value)> {
        let filter = SearchFilter {
            query: target.player_name.clone(),
            team: target.team.clone(),
            position: target.position.clone(),
            limit: REPORT_SEARCH_LIMIT,
        };
        log_tool_invocation(
            "search_players",
            &json!({ "query": filter.query, "team": filter.team, "position": filter.position }),
        );
        let matches = store::search_players(self.conn, &filter)?;

        let best = pick_best_player_match(&target.player_name, &matches);
        if let Some(best) = best {
            log_tool_invocation("get_player_by_id", &json!({ "id": best.unique_id }));
            if let Some(player) = store::get_player(self.conn, &best.unique_id)? {
                let candidates: Vec<&CandidateMatch> = matches.iter().take(5).collect();
                return Ok((
                    "search_players+get_player_by_id".to_string(),
                    json!({
                        "extracted_target": {
                            "player_name": target.player_name,
                            "team": target.team,
                            "position": target.position,
                        },
                        "best_match": best,
                        "player": player,
                        "candidate_matches": candidates,
                    }),
                ));
            }
        }

        Ok((
            "search_players".to_string(),
            json!({
                "extracted_target": {
                    "player_name": target.player_name,
                    "team": target.team,
                    "position": target.position,
                },
                "candidate_matches": matches,
            }),
        ))
    }

    fn pronoun_reference(&self, message: &str, session_id: &str) -> Option<CandidateMatch> {
        if session_id.is_empty() || !PRONOUN_RE.is_match(message) {
            return None;
        }
        self.sessions.get(session_id)
    }
}

/// Ambiguous resolutions short-circuit to a clarification; the generator
/// is never called with candidates the user has not picked between.
fn clarification_reply(outcome: &ToolOutcome) -> Option<String> {
    let ambiguity = outcome.result.get("ambiguity").and_then(Value::as_str)?;
    let query = outcome
        .result
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let candidates = outcome.result.get("candidates").and_then(Value::as_array)?;

    let summary = candidates
        .iter()
        .take(5)
        .enumerate()
        .map(|(idx, candidate)| {
            format!(
                "{}. {} - {} ({}) [id: {}]",
                idx + 1,
                candidate.get("name").and_then(Value::as_str).unwrap_or("?"),
                candidate
                    .get("team")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown team"),
                candidate
                    .get("position")
                    .and_then(Value::as_str)
                    .unwrap_or("N/A"),
                candidate
                    .get("unique_id")
                    .and_then(Value::as_str)
                    .unwrap_or("?"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let reply = if ambiguity == "duplicate_exact_name" {
        format!(
            "I found multiple players with the exact name \"{query}\". Please clarify which one you mean:\n{summary}\n\nYou can reply with the player id, team, or position."
        )
    } else {
        format!(
            "I couldn't find an exact name match for \"{query}\", but I found similar players:\n{summary}\n\nWhich player did you mean? You can reply with the player id, team, or position."
        )
    };
    Some(reply)
}

/// Best match for an extracted name: exact normalized equality, then
/// normalized prefix, then substring, then the first search hit.
fn pick_best_player_match<'m>(
    player_name: &str,
    matches: &'m [CandidateMatch],
) -> Option<&'m CandidateMatch> {
    if player_name.is_empty() || matches.is_empty() {
        return None;
    }
    let target = normalize_name(player_name);
    matches
        .iter()
        .find(|m| normalize_name(&m.name) == target)
        .or_else(|| matches.iter().find(|m| normalize_name(&m.name).starts_with(&target)))
        .or_else(|| matches.iter().find(|m| normalize_name(&m.name).contains(&target)))
        .or_else(|| matches.first())
}

fn log_tool_invocation(tool: &str, args: &Value) {
    eprintln!("[agent] tool_call={tool} args={args}");
}
