use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use cerebro_scout::agent::{Agent, ReportRequest};
use cerebro_scout::llm::ProviderClient;
use cerebro_scout::session::SessionMemory;
use cerebro_scout::{export, intent, prompts, store, thresholds};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("chat");

    let db_path = resolve_db_path()?;
    let conn = store::open_db(&db_path)?;
    let thresholds_path = resolve_thresholds_path()?;
    let generator = ProviderClient::from_env();
    let sessions = SessionMemory::new();
    let agent = Agent::new(&conn, &generator, &sessions, thresholds_path);

    match command {
        "chat" => run_chat_repl(&agent),
        "report" => {
            let message = args[1..].join(" ");
            let outcome = agent.run_report(&ReportRequest {
                message,
                ..ReportRequest::default()
            })?;
            println!("{}", outcome.report);
            println!("\n[tool: {}]", outcome.tool_used);
            Ok(())
        }
        "top" => {
            let metric = args.get(1).map(String::as_str).unwrap_or("pts_g");
            let position = args.get(2).map(String::as_str).unwrap_or("");
            let limit = parse_usize_arg(&args, 3).unwrap_or(intent::DEFAULT_TOP_LIMIT);
            let players = store::top_players_by_metric(
                &conn,
                metric,
                position,
                "",
                limit,
                intent::DEFAULT_MIN_GAMES,
            )?;
            let metric = store::sanitize_metric(metric);
            println!("Top {} by {metric}", players.len());
            for (idx, player) in players.iter().enumerate() {
                println!(
                    "{:>2}. {} ({}) {} = {}",
                    idx + 1,
                    player.name,
                    player.team.as_deref().unwrap_or("?"),
                    metric,
                    prompts::format_stat(player.metric_value(metric), false),
                );
            }
            Ok(())
        }
        "export" => {
            let path = args
                .get(1)
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("usage: cerebro_scout export <path.xlsx> [metric] [limit]"))?;
            let metric = args.get(2).map(String::as_str).unwrap_or("pts_g");
            let limit = parse_usize_arg(&args, 3).unwrap_or(50);
            let players =
                store::top_players_by_metric(&conn, metric, "", "", limit, intent::DEFAULT_MIN_GAMES)?;
            let report = export::export_players(&path, "TopPlayers", &players)?;
            println!(
                "Exported {} players ({} columns) to {}",
                report.players,
                report.columns,
                path.display()
            );
            Ok(())
        }
        other => Err(anyhow!(
            "unknown command '{other}' (expected chat, report, top, or export)"
        )),
    }
}

fn run_chat_repl(agent: &Agent<'_>) -> Result<()> {
    // One session per process so follow-ups like "write a report on that
    // player" resolve against the last answer.
    let session_id = format!("cli-{}", std::process::id());
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("cerebro scout chat (empty line or 'quit' to exit)");
    loop {
        print!("> ");
        stdout.flush().ok();
        let Some(line) = stdin.lock().lines().next() else {
            break;
        };
        let line = line.context("read stdin line")?;
        let message = line.trim();
        if message.is_empty() || message == "quit" || message == "exit" {
            break;
        }
        match agent.run_chat(message, &session_id) {
            Ok(outcome) => {
                println!("{}", outcome.reply);
                println!("[tool: {}]", outcome.tool_used);
            }
            Err(err) => eprintln!("error: {err}"),
        }
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

fn parse_usize_arg(args: &[String], idx: usize) -> Option<usize> {
    args.get(idx).and_then(|raw| raw.parse::<usize>().ok())
}
