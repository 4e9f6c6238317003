// src/pipeline/ranking.rs

//! Yearly expense ranking across every sitting deputy.
//!
//! Expenses are fetched per deputy through a bounded fan-out; totals are
//! merged only after all fetches completed.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::first_text;
use crate::pipeline::fanout::fan_out;
use crate::services::{DataSource, FederalChamber, Paginator};
use crate::utils::console;

/// One deputy's expense total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseTotal {
    pub deputy_id: u64,
    pub name: String,
    pub party: Option<String>,
    pub region: Option<String>,
    pub total: f64,
    pub entries: usize,
    /// Expense pagination hit the page cap
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseRanking {
    pub year: i32,
    /// Highest total first
    pub ranked: Vec<ExpenseTotal>,
    /// Deputies whose expenses could not be fetched
    pub failures: Vec<(u64, String)>,
}

impl ExpenseRanking {
    pub fn print(&self, limit: usize) {
        console::header(&format!("Expense ranking {}", self.year));
        for (i, entry) in self.ranked.iter().take(limit).enumerate() {
            console::sub_item(&format!(
                "{:>3}. {} ({}/{}) R$ {:.2} in {} entries{}",
                i + 1,
                entry.name,
                entry.party.as_deref().unwrap_or("?"),
                entry.region.as_deref().unwrap_or("?"),
                entry.total,
                entry.entries,
                if entry.truncated { " [truncated]" } else { "" }
            ));
        }
        for (id, reason) in &self.failures {
            console::warn(&format!("Deputy {}: {}", id, reason));
        }
        console::summary(
            "Ranking",
            &[
                ("Ranked", self.ranked.len().to_string()),
                ("Failed", self.failures.len().to_string()),
            ],
        );
    }
}

struct Deputy {
    id: u64,
    name: String,
    party: Option<String>,
    region: Option<String>,
}

fn deputy_from(record: &Value) -> Option<Deputy> {
    let id = record.get("id").and_then(Value::as_u64)?;
    Some(Deputy {
        id,
        name: first_text(record, &["nome", "nomeCivil"]).unwrap_or_else(|| id.to_string()),
        party: first_text(record, &["siglaPartido"]),
        region: first_text(record, &["siglaUf"]),
    })
}

/// Sum of `valorLiquido` over expense records; numbers or numeric strings.
pub fn net_total(records: &[Value]) -> f64 {
    records
        .iter()
        .filter_map(|r| r.get("valorLiquido"))
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        })
        .sum()
}

/// Rank every current deputy by net expenses in `year`.
pub async fn rank_expenses(
    chamber: &FederalChamber,
    paginator: &Paginator,
    year: i32,
    concurrency: usize,
) -> Result<ExpenseRanking> {
    let members = chamber.fetch_members().await?;
    let deputies: Vec<Deputy> = members.records.iter().filter_map(deputy_from).collect();
    log::info!(
        "Fetching {} expenses for {} deputies ({} at a time)",
        year,
        deputies.len(),
        concurrency
    );

    let results = fan_out(deputies, concurrency, |deputy| async move {
        let pagination = chamber.all_expenses(paginator, deputy.id, year).await;
        (deputy, pagination)
    })
    .await;

    let mut ranked = Vec::new();
    let mut failures = Vec::new();
    for (deputy, pagination) in results {
        if let Some(failure) = pagination.failure() {
            log::warn!("Expenses of deputy {} unavailable: {}", deputy.id, failure);
            failures.push((deputy.id, failure.to_string()));
            continue;
        }
        ranked.push(ExpenseTotal {
            deputy_id: deputy.id,
            name: deputy.name,
            party: deputy.party,
            region: deputy.region,
            total: net_total(&pagination.records),
            entries: pagination.records.len(),
            truncated: pagination.is_truncated(),
        });
    }

    ranked.sort_by(|a, b| b.total.total_cmp(&a.total));
    Ok(ExpenseRanking {
        year,
        ranked,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FederalConfig;
    use crate::services::HttpRetryClient;
    use crate::services::testing::{RoutedTransport, json_response, quick_policy};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_net_total_accepts_strings() {
        let records = vec![
            json!({"valorLiquido": 10.25}),
            json!({"valorLiquido": "4,75"}),
            json!({"valorLiquido": null}),
            json!({"outro": 1}),
        ];
        assert_eq!(net_total(&records), 15.0);
    }

    #[tokio::test]
    async fn test_rank_expenses() {
        let transport = Arc::new(RoutedTransport::new(vec![
            (
                "/deputados/1/despesas",
                Ok(json_response(200, json!({"dados": [{"valorLiquido": 100.0}], "links": []}))),
            ),
            (
                "/deputados/2/despesas",
                Ok(json_response(
                    200,
                    json!({"dados": [{"valorLiquido": 250.0}, {"valorLiquido": 50.0}], "links": []}),
                )),
            ),
            (
                "/deputados?",
                Ok(json_response(
                    200,
                    json!({"dados": [
                        {"id": 1, "nome": "Ana", "siglaPartido": "PT", "siglaUf": "SC"},
                        {"id": 2, "nome": "Bia", "siglaPartido": "PL", "siglaUf": "SP"},
                        {"id": 3, "nome": "Caio"}
                    ]}),
                )),
            ),
        ]));
        let chamber = FederalChamber::new(
            HttpRetryClient::with_transport(transport, quick_policy(2)),
            FederalConfig {
                base_url: "https://camara.test/api/v2".into(),
                ..FederalConfig::default()
            },
            100,
        );

        let ranking = rank_expenses(&chamber, &Paginator::new(5, Duration::ZERO), 2024, 2)
            .await
            .unwrap();

        let order: Vec<u64> = ranking.ranked.iter().map(|e| e.deputy_id).collect();
        assert_eq!(order, vec![2, 1]);
        assert_eq!(ranking.ranked[0].total, 300.0);
        assert_eq!(ranking.ranked[0].entries, 2);
        assert_eq!(ranking.failures.len(), 1);
        assert_eq!(ranking.failures[0].0, 3);
    }
}
