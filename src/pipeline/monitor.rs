// src/pipeline/monitor.rs

//! New-proposal monitor.
//!
//! Searches the newest proposals for each keyword, keeps those above the
//! cursor, alerts about them and moves the cursor to the highest id seen.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::services::notifier::send_batch;
use crate::services::{FederalChamber, Notifier};
use crate::storage::CursorTracker;
use crate::utils::{console, truncate_chars};

/// Summary length limit in alert messages, in characters.
const SUMMARY_LIMIT: usize = 400;

/// What to look for.
#[derive(Debug, Clone)]
pub struct MonitorQuery {
    pub keywords: Vec<String>,
    /// Proposal type code; empty matches every type
    pub type_code: String,
    pub max_results: usize,
}

/// A proposal not seen before, with the keyword that surfaced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProposal {
    pub id: u64,
    pub keyword: String,
    pub record: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub previous_cursor: u64,
    pub found: usize,
    pub delivered: usize,
    /// Cursor after the check, if it moved
    pub new_cursor: Option<u64>,
}

/// Alert text for one proposal (Telegram Markdown).
pub fn format_proposal_message(proposal: &NewProposal) -> String {
    let text = |key: &str| -> String {
        match proposal.record.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    };

    let summary = match text("ementa") {
        s if s.trim().is_empty() => "Sem descrição.".to_string(),
        s => truncate_chars(&s, SUMMARY_LIMIT),
    };

    format!(
        "🏛️ *Nova Proposição Detectada*\n\
         ━━━━━━━━━━━━━━━━━━━━\n\
         📄 *{} {}/{}*\n\
         🔍 Palavra-chave: `{}`\n\n\
         📝 *Ementa:*\n{}\n\n\
         🔗 [Ver na Câmara]({})\n\
         ID: `{}`",
        text("siglaTipo"),
        text("numero"),
        text("ano"),
        proposal.keyword,
        summary,
        text("uri"),
        proposal.id
    )
}

/// Keep proposals above `last_id`, first keyword wins, newest first.
pub fn select_new(last_id: u64, batches: Vec<(String, Vec<Value>)>) -> Vec<NewProposal> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for (keyword, records) in batches {
        for record in records {
            let Some(id) = record.get("id").and_then(Value::as_u64) else {
                continue;
            };
            if id > last_id && seen.insert(id) {
                found.push(NewProposal {
                    id,
                    keyword: keyword.clone(),
                    record,
                });
            }
        }
    }

    found.sort_by(|a, b| b.id.cmp(&a.id));
    found
}

/// One monitoring pass.
pub async fn run_monitor_once(
    chamber: &FederalChamber,
    cursor: &CursorTracker,
    notifier: &dyn Notifier,
    query: &MonitorQuery,
) -> Result<MonitorReport> {
    let last_id = cursor.load().await;
    console::info(&format!(
        "Checking proposals (keywords: {}; last id {})",
        query.keywords.join(", "),
        last_id
    ));

    let mut batches = Vec::with_capacity(query.keywords.len());
    for keyword in &query.keywords {
        match chamber
            .search_proposals(keyword, &query.type_code, query.max_results)
            .await
        {
            Ok(page) => batches.push((keyword.clone(), page.records)),
            Err(failure) => log::warn!("Search for '{}' failed: {}", keyword, failure),
        }
    }

    let found = select_new(last_id, batches);
    let mut report = MonitorReport {
        previous_cursor: last_id,
        found: found.len(),
        ..MonitorReport::default()
    };
    console::info(&format!("{} new proposal(s)", found.len()));
    if found.is_empty() {
        return Ok(report);
    }

    let messages: Vec<String> = found.iter().map(format_proposal_message).collect();
    report.delivered = send_batch(notifier, &messages).await;
    console::info(&format!(
        "{}/{} alerts delivered via {}",
        report.delivered,
        messages.len(),
        notifier.name()
    ));

    // Sorted newest first.
    let max_id = found[0].id;
    if max_id > last_id {
        cursor.save(max_id).await?;
        report.new_cursor = Some(max_id);
    }
    Ok(report)
}

/// Check every `interval` until the process is stopped.
pub async fn run_monitor_loop(
    chamber: &FederalChamber,
    cursor: &CursorTracker,
    notifier: &dyn Notifier,
    query: &MonitorQuery,
    interval: Duration,
) -> Result<()> {
    loop {
        if let Err(e) = run_monitor_once(chamber, cursor, notifier, query).await {
            log::error!("Monitor pass failed: {}", e);
        }
        console::info(&format!("Next check in {} min", interval.as_secs() / 60));
        tokio::time::sleep(interval).await;
    }
}
