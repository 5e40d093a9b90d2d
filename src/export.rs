use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::prompts::format_stat;
use crate::store::{METRIC_ALLOWLIST, PlayerRow};

pub struct ExportReport {
    pub players: usize,
    pub columns: usize,
}

/// Write a ranked player list to an xlsx workbook: one identity block,
/// then every allow-listed metric as its own column.
pub fn export_players(path: &Path, sheet_name: &str, players: &[PlayerRow]) -> Result<ExportReport> {
    let mut header: Vec<String> = vec![
        "ID".to_string(),
        "Name".to_string(),
        "Team".to_string(),
        "Position".to_string(),
        "Class".to_string(),
        "League".to_string(),
        "Games".to_string(),
    ];
    header.extend(METRIC_ALLOWLIST.iter().map(|metric| metric.to_string()));
    let columns = header.len();

    let mut rows: Vec<Vec<String>> = vec![header];
    for player in players {
        let mut row = vec![
            player.unique_id.clone(),
            player.name.clone(),
            player.team.clone().unwrap_or_default(),
            player.position.clone().unwrap_or_default(),
            player.class.clone().unwrap_or_default(),
            player.league.clone().unwrap_or_default(),
            player.g.map(|g| g.to_string()).unwrap_or_default(),
        ];
        for metric in METRIC_ALLOWLIST {
            row.push(format_stat(player.metric_value(metric), false));
        }
        rows.push(row);
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name).context("set worksheet name")?;
    write_rows(sheet, &rows)?;
    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;

    Ok(ExportReport {
        players: players.len(),
        columns,
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
