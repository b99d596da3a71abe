//! Supabase/PostgREST implementation of [`CloudStore`].

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{CloudError, CloudQuery, CloudResult, CloudStore, Filter};
use crate::config::CloudConfig;
use crate::models::{Row, Table};
use crate::util::compact_text;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

/// HTTP client for `<url>/rest/v1/<table>`.
#[derive(Clone)]
pub struct PostgrestCloudStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for PostgrestCloudStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgrestCloudStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PostgrestCloudStore {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        if !config.is_configured() {
            return Err(CloudError::InvalidConfiguration(
                "cloud url (http/https) and api key are required".to_string(),
            ));
        }
        let (Some(url), Some(api_key)) = (config.url.as_deref(), config.api_key.as_deref()) else {
            return Err(CloudError::InvalidConfiguration(
                "cloud url and api key are required".to_string(),
            ));
        };

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn request(&self, method: reqwest::Method, table: Table) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }
}

impl CloudStore for PostgrestCloudStore {
    async fn select(&self, table: Table, query: &CloudQuery) -> CloudResult<Vec<Row>> {
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&query_params(query))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let payload = response.json::<Value>().await?;
        match payload {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(CloudError::InvalidPayload(format!(
                        "expected row object from {table}, got {}",
                        compact_text(&other.to_string())
                    ))),
                })
                .collect(),
            other => Err(CloudError::InvalidPayload(format!(
                "expected row array from {table}, got {}",
                compact_text(&other.to_string())
            ))),
        }
    }

    async fn upsert(&self, table: Table, rows: &[Row]) -> CloudResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::POST, table)
            .query(&[("on_conflict", "id")])
            .header("Prefer", UPSERT_PREFERENCE)
            .json(rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }
}

/// Render a query as PostgREST URL parameters.
pub fn query_params(query: &CloudQuery) -> Vec<(String, String)> {
    let mut params = Vec::new();

    let select = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    };
    params.push(("select".to_string(), select));

    let mut groups: Vec<(&str, String)> = Vec::new();
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => {
                params.push((column.clone(), format!("eq.{}", scalar_text(value))));
            }
            Filter::In { column, values } => {
                let list = values
                    .iter()
                    .map(|value| quote(value))
                    .collect::<Vec<_>>()
                    .join(",");
                params.push((column.clone(), format!("in.({list})")));
            }
            Filter::AtOrAfter { columns, instant } => {
                let terms = columns
                    .iter()
                    .map(|column| format!("{column}.gte.{}", quote(instant)))
                    .collect::<Vec<_>>();
                groups.push(("or", terms.join(",")));
            }
            Filter::ShopScope { shop_id } => {
                groups.push(("or", format!("shop_id.eq.{},shop_id.is.null", quote(shop_id))));
            }
            Filter::KeysetAfter { column, value, id } => {
                groups.push(keyset_group(column, value.as_deref(), id));
            }
        }
    }

    match groups.as_slice() {
        [] => {}
        [(operator, body)] => params.push(((*operator).to_string(), format!("({body})"))),
        _ => {
            let nested = groups
                .iter()
                .map(|(operator, body)| format!("{operator}({body})"))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("and".to_string(), format!("({nested})")));
        }
    }

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|column| format!("{column}.asc"))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if query.offset > 0 {
        params.push(("offset".to_string(), query.offset.to_string()));
    }

    params
}

/// Nulls sort last, so a null cursor only continues among null rows.
fn keyset_group(column: &str, value: Option<&str>, id: &str) -> (&'static str, String) {
    let id = quote(id);
    match value {
        Some(value) => {
            let value = quote(value);
            (
                "or",
                format!("{column}.gt.{value},and({column}.eq.{value},id.gt.{id}),{column}.is.null"),
            )
        }
        None => ("and", format!("{column}.is.null,id.gt.{id}")),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

async fn api_error(response: reqwest::Response) -> CloudError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    CloudError::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.hint {
                Some(hint) => format!("{} ({})", message.trim(), hint.trim()),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }

    #[test]
    fn renders_pull_query() {
        let query = CloudQuery::new()
            .filter(Filter::ShopScope {
                shop_id: "shop_1".into(),
            })
            .filter(Filter::AtOrAfter {
                columns: vec!["updated_at".into(), "deleted_at".into()],
                instant: "2024-01-01T00:00:00Z".into(),
            })
            .order_by("updated_at")
            .order_by("id")
            .page(1000, 1000);

        assert_eq!(
            pairs(&query_params(&query)),
            vec![
                ("select", "*"),
                (
                    "and",
                    r#"(or(shop_id.eq."shop_1",shop_id.is.null),or(updated_at.gte."2024-01-01T00:00:00Z",deleted_at.gte."2024-01-01T00:00:00Z"))"#
                ),
                ("order", "updated_at.asc,id.asc"),
                ("limit", "1000"),
                ("offset", "1000"),
            ]
        );
    }

    #[test]
    fn renders_keyset_cursor() {
        let query = CloudQuery::new()
            .filter(Filter::ShopScope {
                shop_id: "shop_1".into(),
            })
            .after("updated_at", Some("2024-01-02T00:00:00Z"), "b")
            .order_by("updated_at")
            .order_by("id")
            .page(0, 2);

        assert_eq!(
            pairs(&query_params(&query)),
            vec![
                ("select", "*"),
                (
                    "and",
                    r#"(or(shop_id.eq."shop_1",shop_id.is.null),or(updated_at.gt."2024-01-02T00:00:00Z",and(updated_at.eq."2024-01-02T00:00:00Z",id.gt."b"),updated_at.is.null))"#
                ),
                ("order", "updated_at.asc,id.asc"),
                ("limit", "2"),
            ]
        );

        let null_cursor = CloudQuery::new().after("updated_at", None, "z");
        assert_eq!(
            pairs(&query_params(&null_cursor)),
            vec![("select", "*"), ("and", r#"(updated_at.is.null,id.gt."z")"#)]
        );
    }

    #[test]
    fn single_group_uses_or_parameter() {
        let query = CloudQuery::new().filter(Filter::ShopScope {
            shop_id: "shop_1".into(),
        });
        assert_eq!(
            pairs(&query_params(&query)),
            vec![("select", "*"), ("or", r#"(shop_id.eq."shop_1",shop_id.is.null)"#)]
        );
    }

    #[test]
    fn renders_id_lookup() {
        let query = CloudQuery::new()
            .columns(&["id", "updated_at", "deleted_at"])
            .is_in("id", vec!["a".into(), "b\"c".into()])
            .eq("id", "a");

        assert_eq!(
            pairs(&query_params(&query)),
            vec![
                ("select", "id,updated_at,deleted_at"),
                ("id", r#"in.("a","b\"c")"#),
                ("id", "eq.a"),
            ]
        );
    }

    #[test]
    fn parse_api_error_prefers_message() {
        let message = parse_api_error(
            StatusCode::CONFLICT,
            r#"{"message":"duplicate key","hint":"check id"}"#,
        );
        assert_eq!(message, "duplicate key (check id)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "upstream"), "upstream");
    }

    #[test]
    fn new_rejects_unconfigured_and_redacts_key() {
        assert!(PostgrestCloudStore::new(&CloudConfig::default()).is_err());

        let store =
            PostgrestCloudStore::new(&CloudConfig::new("https://demo.supabase.co/", "secret"))
                .unwrap();
        assert_eq!(store.table_url(Table::Bills), "https://demo.supabase.co/rest/v1/bills");
        assert!(!format!("{store:?}").contains("secret"));
    }
}
