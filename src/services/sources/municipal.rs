//! Municipal chamber JSON-web API.
//!
//! One endpoint serves every resource, selected with `call=<service>` and
//! authorized with a `keysoft` token. Paginated services take `pagina=N`
//! and answer an empty list past the last page.

use async_trait::async_trait;

use crate::models::{Continuation, MunicipalConfig, PageCursor, ResourceKind, ResourceSpec};
use crate::services::HttpRetryClient;
use crate::services::sources::{DataSource, FetchResult};

pub struct MunicipalChamber {
    client: HttpRetryClient,
    config: MunicipalConfig,
}

impl MunicipalChamber {
    pub fn new(client: HttpRetryClient, config: MunicipalConfig) -> Self {
        if config.token.is_empty() {
            log::warn!(
                "[{}] No API token configured (set CMF_KEYSOFT); requests may be rejected",
                config.source_id
            );
        }
        Self { client, config }
    }

    async fn call(&self, service: &str, cursor: Option<PageCursor>) -> FetchResult {
        if let Some(PageCursor::Link(link)) = &cursor {
            return self.client.request(link, &[]).await;
        }

        let mut params = vec![
            ("keysoft", self.config.token.clone()),
            ("call", service.to_string()),
        ];
        if let Some(page) = cursor.as_ref().and_then(PageCursor::number) {
            params.push(("pagina", page.to_string()));
        }
        log::debug!("[{}] GET call={} {:?}", self.config.source_id, service, cursor);
        self.client.request(&self.config.base_url, &params).await
    }
}

#[async_trait]
impl DataSource for MunicipalChamber {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn region(&self) -> Option<&str> {
        Some(&self.config.region)
    }

    fn continuation(&self) -> Continuation {
        Continuation::PageNumber
    }

    fn resources(&self) -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::single(ResourceKind::Members),
            ResourceSpec::paginated(ResourceKind::Agenda),
            ResourceSpec::paginated(ResourceKind::News),
            ResourceSpec::paginated(ResourceKind::Proposals),
        ]
    }

    async fn fetch_members(&self) -> FetchResult {
        self.call("vereadores", None).await
    }

    async fn fetch_proposals(&self, cursor: PageCursor) -> FetchResult {
        self.call("proposicoes", Some(cursor)).await
    }

    async fn fetch_agenda(&self, cursor: PageCursor) -> FetchResult {
        self.call("pautas", Some(cursor)).await
    }

    async fn fetch_news(&self, cursor: PageCursor) -> FetchResult {
        self.call("noticias", Some(cursor)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{ScriptedTransport, json_response, quick_policy};
    use serde_json::json;
    use std::sync::Arc;

    fn chamber(transport: &Arc<ScriptedTransport>) -> MunicipalChamber {
        let config = MunicipalConfig {
            base_url: "https://camara.test/jsonweb/web-aplicativo.php".into(),
            token: "tok".into(),
            ..MunicipalConfig::default()
        };
        MunicipalChamber::new(
            HttpRetryClient::with_transport(transport.clone(), quick_policy(2)),
            config,
        )
    }

    #[tokio::test]
    async fn test_paged_call_parameters() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(json_response(
            200,
            json!({"pautas": [{"titulo": "Sessão"}]}),
        ))]));

        let page = chamber(&transport)
            .fetch_agenda(PageCursor::Number(3))
            .await
            .unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(
            transport.urls(),
            vec!["https://camara.test/jsonweb/web-aplicativo.php?keysoft=tok&call=pautas&pagina=3"]
        );
    }

    #[tokio::test]
    async fn test_members_are_not_paged() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(json_response(
            200,
            json!([{"nome": "Ana"}, {"nome": "Bia"}]),
        ))]));

        let source = chamber(&transport);
        let page = source.fetch(ResourceKind::Members, PageCursor::Number(9)).await.unwrap();

        assert_eq!(page.len(), 2);
        assert!(!transport.urls()[0].contains("pagina"));
        assert_eq!(source.source_id(), "florianopolis");
        assert_eq!(source.region(), Some("SC"));
    }
}
