//! Prompt templates for the chat and report agents.
//!
//! Every template embeds its evidence inline as JSON and instructs the
//! model to ground itself in that evidence only, since the output is
//! shown to end users as factual scouting material.

use serde_json::Value;

use crate::store::METRIC_ALLOWLIST;

/// Routing prompt: enumerates the exact allowed tool names and argument
/// shapes so the reply can be decoded without guessing.
pub fn router_prompt(message: &str) -> String {
    format!(
        "You are a routing agent for basketball database tools.\n\
         Return ONLY valid JSON with this schema:\n\
         {{\n\
         \x20 \"tool\": \"search_players\" | \"get_player_by_id\" | \"top_players\" | \"top_players_by_position\" | \"none\",\n\
         \x20 \"args\": {{ ... }}\n\
         }}\n\
         \n\
         Guidelines:\n\
         - Use \"search_players\" when the user asks to find players by name/team/position.\n\
         - Use \"get_player_by_id\" only if the user explicitly provides an id.\n\
         - Use \"top_players\" when the user asks for top/best/ranking by a metric.\n\
         - Use \"top_players_by_position\" when the user asks who is most effective or impactful at a position without naming a metric.\n\
         - Use \"none\" for pure conversation.\n\
         - Allowed metrics: {metrics}\n\
         - For \"search_players\" args, use:\n\
         \x20 {{ \"query\": \"<player name or search text>\", \"team\": \"\", \"position\": \"\", \"limit\": 20 }}\n\
         - Do not use \"name\" as a key. Put player names in \"query\".\n\
         \n\
         User message:\n\
         {message}",
        metrics = METRIC_ALLOWLIST.join(", "),
    )
}

/// Extraction prompt: pull a report target out of free text.
pub fn extraction_prompt(message: &str) -> String {
    format!(
        "Extract report target fields from this basketball request.\n\
         Return ONLY valid JSON with this exact schema:\n\
         {{\n\
         \x20 \"playerName\": \"\",\n\
         \x20 \"team\": \"\",\n\
         \x20 \"position\": \"\"\n\
         }}\n\
         \n\
         Rules:\n\
         - If a field is unknown, return an empty string.\n\
         - playerName should be a full player name if present.\n\
         \n\
         Request:\n\
         {message}"
    )
}

/// Chat reply prompt over assembled evidence. An empty evidence object
/// still renders; the model is told to say it lacks database evidence.
pub fn chat_reply_prompt(message: &str, tool: &str, evidence: &Value) -> String {
    format!(
        "You are the chat agent for a basketball analytics app.\n\
         You must use ONLY the tool result below for factual claims.\n\
         Do NOT use outside knowledge, assumptions, or any external data.\n\
         If the tool result is null/empty or does not contain enough data, \
         say you do not have enough database evidence and ask a clarifying question.\n\
         \n\
         User message:\n\
         {message}\n\
         \n\
         Tool used: {tool}\n\
         Tool result JSON:\n\
         {evidence}\n\
         \n\
         Return a concise, helpful response grounded only in the tool result.",
        evidence = evidence,
    )
}

/// Report prompt with the fixed section ordering.
pub fn report_prompt(message: &str, evidence: &Value) -> String {
    let request = if message.trim().is_empty() {
        "Generate a scouting report from provided player data."
    } else {
        message
    };
    format!(
        "You are the report-generation agent for basketball scouting.\n\
         Generate a coach-friendly, evidence-based report from the data below.\n\
         Use ONLY the evidence JSON for factual claims.\n\
         Do NOT use outside knowledge, assumptions, memory, or any external data.\n\
         If data is incomplete, explicitly state limitations.\n\
         \n\
         User request:\n\
         {request}\n\
         \n\
         Evidence JSON:\n\
         {evidence}\n\
         \n\
         Required output format:\n\
         1) Player/Cohort Overview\n\
         2) Key Strengths\n\
         3) Key Concerns\n\
         4) Metrics Snapshot\n\
         5) Projection / Recommendation\n\
         \n\
         Use markdown and include specific numbers from evidence where available.",
        evidence = evidence,
    )
}

/// Shooting splits and ratios are stored as fractions; render them as
/// percentages with one decimal. Counting stats keep one decimal too.
pub fn format_stat(value: Option<f64>, is_percentage: bool) -> String {
    match value {
        None => "N/A".to_string(),
        Some(v) if is_percentage => format!("{:.1}%", v * 100.0),
        Some(v) => format!("{v:.1}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{chat_reply_prompt, format_stat, report_prompt, router_prompt};

    #[test]
    fn format_stat_handles_missing_and_percent() {
        assert_eq!(format_stat(None, false), "N/A");
        assert_eq!(format_stat(Some(0.512), true), "51.2%");
        assert_eq!(format_stat(Some(21.34), false), "21.3");
    }

    #[test]
    fn router_prompt_names_every_tool() {
        let prompt = router_prompt("find Jane Doe");
        for tool in [
            "search_players",
            "get_player_by_id",
            "top_players",
            "top_players_by_position",
            "none",
        ] {
            assert!(prompt.contains(tool), "router prompt should name {tool}");
        }
    }

    #[test]
    fn prompts_embed_evidence_json() {
        let evidence = json!({"player": {"name": "Jane Doe", "pts_g": 21.4}});
        assert!(chat_reply_prompt("who is jane", "search_players", &evidence).contains("21.4"));
        assert!(report_prompt("", &evidence).contains("Jane Doe"));
    }
}
