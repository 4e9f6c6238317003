//! A single parsed API response and the cursor that addresses it.

use serde_json::Value;

/// How a paginated endpoint announces that more data exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// `?pagina=N`; the first empty page ends the data
    PageNumber,
    /// Follow the `rel == "next"` entry of the `links` array
    NextLink,
}

/// Position of a page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// 1-based page number
    Number(u32),
    /// Absolute URL taken from a previous page's `next` link
    Link(String),
}

impl PageCursor {
    pub fn first() -> Self {
        PageCursor::Number(1)
    }

    /// Page number, if this cursor is numeric.
    pub fn number(&self) -> Option<u32> {
        match self {
            PageCursor::Number(n) => Some(*n),
            PageCursor::Link(_) => None,
        }
    }
}

/// One HTTP response body, parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePage {
    pub records: Vec<Value>,
    /// URL of the next page, when the API publishes HATEOAS links
    pub next_link: Option<String>,
    /// Total record count announced by the server
    pub total_hint: Option<u64>,
}

impl ResourcePage {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_next_link(mut self, link: impl Into<String>) -> Self {
        self.next_link = Some(link.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Interpret a JSON body.
    ///
    /// Accepts a bare array, or an object carrying its records under `data`
    /// or `dados`. Objects without either fall back to their first array-valued
    /// field. Scalars are rejected.
    pub fn from_json(body: Value, header_total: Option<u64>) -> Result<Self, String> {
        match body {
            Value::Array(records) => Ok(Self {
                records,
                next_link: None,
                total_hint: header_total,
            }),
            Value::Object(mut map) => {
                let next_link = map
                    .get("links")
                    .and_then(Value::as_array)
                    .and_then(|links| extract_next_link(links));

                let total_hint = header_total.or_else(|| {
                    ["total", "count"]
                        .iter()
                        .find_map(|key| map.get(*key).and_then(Value::as_u64))
                });

                let records_key = match ["data", "dados"]
                    .iter()
                    .find(|key| map.get(**key).is_some_and(Value::is_array))
                {
                    Some(key) => Some(key.to_string()),
                    None => map
                        .iter()
                        .find(|(key, value)| value.is_array() && key.as_str() != "links")
                        .map(|(key, _)| key.clone()),
                };

                let records = match records_key.and_then(|key| map.remove(&key)) {
                    Some(Value::Array(records)) => records,
                    _ => Vec::new(),
                };

                Ok(Self {
                    records,
                    next_link,
                    total_hint,
                })
            }
            other => Err(format!(
                "expected a JSON array or object, got {}",
                json_type_name(&other)
            )),
        }
    }
}

/// Find the `href` of the `rel == "next"` link.
fn extract_next_link(links: &[Value]) -> Option<String> {
    links
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("href").and_then(Value::as_str))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array() {
        let page = ResourcePage::from_json(json!([{"id": 1}, {"id": 2}]), Some(10)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.next_link, None);
        assert_eq!(page.total_hint, Some(10));
    }

    #[test]
    fn test_hateoas_object() {
        let body = json!({
            "dados": [{"id": 1}],
            "links": [
                {"rel": "self", "href": "https://api.test/x?pagina=1"},
                {"rel": "next", "href": "https://api.test/x?pagina=2"},
                {"rel": "last", "href": "https://api.test/x?pagina=9"}
            ]
        });
        let page = ResourcePage::from_json(body, None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.next_link.as_deref(), Some("https://api.test/x?pagina=2"));
    }

    #[test]
    fn test_data_key_and_total() {
        let body = json!({"data": [{"id": 1}, {"id": 2}], "total": 40});
        let page = ResourcePage::from_json(body, None).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.total_hint, Some(40));
    }

    #[test]
    fn test_first_array_fallback() {
        let body = json!({"status": "ok", "vereadores": [{"nome": "Ana"}]});
        let page = ResourcePage::from_json(body, None).unwrap();
        assert_eq!(page.records, vec![json!({"nome": "Ana"})]);
    }

    #[test]
    fn test_first_array_in_document_order() {
        let body: Value =
            serde_json::from_str(r#"{"vereadores": [{"nome": "Ana"}], "erros": []}"#).unwrap();
        let page = ResourcePage::from_json(body, None).unwrap();
        assert_eq!(page.records, vec![json!({"nome": "Ana"})]);
    }

    #[test]
    fn test_object_without_records_is_empty() {
        let body = json!({"links": [{"rel": "self", "href": "x"}], "message": "none"});
        let page = ResourcePage::from_json(body, None).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_scalar_rejected() {
        let err = ResourcePage::from_json(json!("maintenance"), None).unwrap_err();
        assert!(err.contains("string"));
    }
}
