//! Chamber of Deputies open-data API (v2).
//!
//! Responses carry records under `dados` and HATEOAS `links`; page size is
//! chosen with `itens` and the total count comes back in `x-total-count`.

use async_trait::async_trait;

use crate::error::FetchFailure;
use crate::models::{Continuation, FederalConfig, PageCursor, ResourceKind, ResourceSpec};
use crate::services::HttpRetryClient;
use crate::services::paginator::{Pagination, Paginator};
use crate::services::sources::{DataSource, FetchResult};
use crate::utils::endpoint;

pub struct FederalChamber {
    client: HttpRetryClient,
    config: FederalConfig,
    page_size: usize,
}

impl FederalChamber {
    pub fn new(client: HttpRetryClient, config: FederalConfig, page_size: usize) -> Self {
        Self {
            client,
            config,
            page_size: page_size.max(1),
        }
    }

    async fn get(&self, path: &str, cursor: Option<PageCursor>, extra: &[(&str, String)]) -> FetchResult {
        if let Some(PageCursor::Link(link)) = &cursor {
            return self.client.request(link, &[]).await;
        }

        let url = endpoint(&self.config.base_url, path).map_err(|e| {
            FetchFailure::permanent(format!("{}/{}", self.config.base_url, path), 0, e)
        })?;

        let mut params: Vec<(&str, String)> = extra.to_vec();
        if let Some(page) = cursor.as_ref().and_then(PageCursor::number) {
            params.push(("itens", self.page_size.to_string()));
            params.push(("pagina", page.to_string()));
        }
        self.client.request(url.as_str(), &params).await
    }

    /// Newest proposals matching `keyword`, one page, highest id first.
    ///
    /// An empty `type_code` searches every proposal type.
    pub async fn search_proposals(
        &self,
        keyword: &str,
        type_code: &str,
        max_results: usize,
    ) -> FetchResult {
        let mut params = vec![
            ("keywords", keyword.to_string()),
            ("itens", max_results.to_string()),
            ("ordem", "DESC".to_string()),
            ("ordenarPor", "id".to_string()),
        ];
        if !type_code.is_empty() {
            params.push(("siglaTipo", type_code.to_string()));
        }
        self.get("proposicoes", None, &params).await
    }

    /// One page of a deputy's expenses for `year`.
    pub async fn fetch_expenses(&self, deputy_id: u64, year: i32, cursor: PageCursor) -> FetchResult {
        let path = format!("deputados/{deputy_id}/despesas");
        let params = [
            ("ano", year.to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "ano".to_string()),
        ];
        self.get(&path, Some(cursor), &params).await
    }

    /// Every expense of a deputy for `year`.
    pub async fn all_expenses(&self, paginator: &Paginator, deputy_id: u64, year: i32) -> Pagination {
        paginator
            .fetch_all(self.continuation(), |cursor| {
                self.fetch_expenses(deputy_id, year, cursor)
            })
            .await
    }
}

#[async_trait]
impl DataSource for FederalChamber {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn continuation(&self) -> Continuation {
        Continuation::NextLink
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::single(ResourceKind::Members),
            ResourceSpec::paginated(ResourceKind::Agenda),
            ResourceSpec::paginated(ResourceKind::Proposals),
        ]
    }

    async fn fetch_members(&self) -> FetchResult {
        let params = [
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "nome".to_string()),
        ];
        self.get("deputados", None, &params).await
    }

    async fn fetch_proposals(&self, cursor: PageCursor) -> FetchResult {
        let params = [
            ("ordem", "DESC".to_string()),
            ("ordenarPor", "id".to_string()),
        ];
        self.get("proposicoes", Some(cursor), &params).await
    }

    async fn fetch_agenda(&self, cursor: PageCursor) -> FetchResult {
        self.get("eventos", Some(cursor), &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{ScriptedTransport, json_response, quick_policy};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn chamber(transport: &Arc<ScriptedTransport>) -> FederalChamber {
        let config = FederalConfig {
            base_url: "https://camara.test/api/v2".into(),
            ..FederalConfig::default()
        };
        FederalChamber::new(
            HttpRetryClient::with_transport(transport.clone(), quick_policy(2)),
            config,
            2,
        )
    }

    #[tokio::test]
    async fn test_search_proposals_parameters() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(json_response(
            200,
            json!({"dados": [{"id": 10}], "links": []}),
        ))]));

        chamber(&transport)
            .search_proposals("saúde", "PL", 20)
            .await
            .unwrap();

        let url = url::Url::parse(&transport.urls()[0]).unwrap();
        assert_eq!(url.path(), "/api/v2/proposicoes");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("keywords".into(), "saúde".into())));
        assert!(pairs.contains(&("siglaTipo".into(), "PL".into())));
        assert!(pairs.contains(&("ordenarPor".into(), "id".into())));
    }

    #[tokio::test]
    async fn test_expenses_follow_next_links() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(json_response(
                200,
                json!({
                    "dados": [{"valorLiquido": 10.5}, {"valorLiquido": 4.5}],
                    "links": [{"rel": "next", "href": "https://camara.test/api/v2/deputados/7/despesas?pagina=2"}]
                }),
            )),
            Ok(json_response(200, json!({"dados": [{"valorLiquido": 1.0}], "links": []}))),
        ]));

        let source = chamber(&transport);
        let result = source
            .all_expenses(&Paginator::new(10, Duration::ZERO), 7, 2024)
            .await;

        assert_eq!(result.records.len(), 3);
        assert_eq!(transport.calls(), 2);
        let urls = transport.urls();
        assert!(urls[0].contains("/deputados/7/despesas?ano=2024"));
        assert!(urls[0].contains("itens=2&pagina=1"));
        assert_eq!(urls[1], "https://camara.test/api/v2/deputados/7/despesas?pagina=2");
    }
}
