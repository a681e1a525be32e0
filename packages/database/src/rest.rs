//! PostgREST-style table store client.
//!
//! Tables live under `<base>/rest/v1/<table>`. Writes use
//! `Prefer: resolution=merge-duplicates` with an `on_conflict` target;
//! reads page with `Range` headers and ask for `count=exact` so the total
//! comes back in `Content-Range`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::DbError;
use crate::store::{Filter, Page, Select, TableStore};

/// Environment variable holding the datastore base URL.
pub const STORE_URL_ENV: &str = "LADDER_STORE_URL";

/// Environment variable holding the datastore service key.
pub const STORE_KEY_ENV: &str = "LADDER_STORE_KEY";

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 500;

/// Per-request timeout for datastore calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// [`TableStore`] backed by a PostgREST endpoint.
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Creates a client for the store at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, DbError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Creates a client from [`STORE_URL_ENV`] and [`STORE_KEY_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingEnv`] if either variable is unset or empty.
    pub fn from_env() -> Result<Self, DbError> {
        let url = required_env(STORE_URL_ENV)?;
        let key = required_env(STORE_KEY_ENV)?;
        Self::new(&url, &key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn required_env(name: &str) -> Result<String, DbError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DbError::MissingEnv {
            name: name.to_string(),
        })
}

/// Turns a non-success response into [`DbError::Status`].
async fn check(table: &str, response: reqwest::Response) -> Result<reqwest::Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    Err(DbError::Status {
        table: table.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Query parameter for one filter.
#[must_use]
pub fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", plain_value(value))),
        Filter::In(column, values) => (column.clone(), in_list(values)),
    }
}

/// `in.(...)` operand with string items double-quoted.
#[must_use]
pub fn in_list(values: &[Value]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|value| match value {
            Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            other => other.to_string(),
        })
        .collect();
    format!("in.({})", items.join(","))
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Total from a `Content-Range` header such as `0-999/5321` or `*/0`.
#[must_use]
pub fn content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

fn header_total(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_range_total)
}

#[async_trait]
impl TableStore for RestStore {
    async fn upsert(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<Vec<Value>, DbError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows)
            .send()
            .await?;
        let written: Vec<Value> = check(table, response).await?.json().await?;
        log::debug!("{table}: upserted {} row(s)", written.len());
        Ok(written)
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, DbError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let mut written: Vec<Value> = check(table, response).await?.json().await?;
        written.pop().ok_or_else(|| DbError::Conversion {
            message: format!("{table}: insert returned no row"),
        })
    }

    async fn select(&self, table: &str, query: &Select) -> Result<Page, DbError> {
        if query.limit == 0 {
            return Ok(Page::default());
        }
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query.columns.join(",")
        };
        let mut params = vec![
            ("select".to_string(), columns),
            ("order".to_string(), "id.asc".to_string()),
        ];
        params.extend(query.filters.iter().map(filter_param));

        let last = query.offset + query.limit - 1;
        let response = self
            .request(Method::GET, table)
            .query(&params)
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{last}", query.offset))
            .header("Prefer", "count=exact")
            .send()
            .await?;

        // Past the end of the table.
        if response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Page {
                rows: Vec::new(),
                total: header_total(&response),
            });
        }

        let response = check(table, response).await?;
        let total = header_total(&response);
        let rows: Vec<Value> = response.json().await?;
        Ok(Page { rows, total })
    }

    async fn delete_in(
        &self,
        table: &str,
        column: &str,
        values: &[Value],
    ) -> Result<u64, DbError> {
        if values.is_empty() {
            return Ok(0);
        }
        let response = self
            .request(Method::DELETE, table)
            .query(&[(column, in_list(values))])
            .header("Prefer", "return=minimal,count=exact")
            .send()
            .await?;
        let response = check(table, response).await?;
        Ok(header_total(&response).unwrap_or(values.len() as u64))
    }

    async fn patch(&self, table: &str, id: i64, changes: &Value) -> Result<(), DbError> {
        let response = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(changes)
            .send()
            .await?;
        check(table, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_in_filters_with_quoted_strings() {
        assert_eq!(in_list(&[json!(1), json!(22)]), "in.(1,22)");
        assert_eq!(
            in_list(&[json!("Zed"), json!("a,b"), json!("say \"hi\"")]),
            r#"in.("Zed","a,b","say \"hi\"")"#
        );
    }

    #[test]
    fn renders_eq_filter() {
        let (column, value) = filter_param(&Filter::Eq("region".to_string(), json!("EU")));
        assert_eq!(column, "region");
        assert_eq!(value, "eq.EU");
        let (_, value) = filter_param(&Filter::Eq("id".to_string(), json!(7)));
        assert_eq!(value, "eq.7");
    }

    #[test]
    fn parses_content_range_totals() {
        assert_eq!(content_range_total("0-999/5321"), Some(5321));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let store = RestStore::new("https://db.example.com/", "key").unwrap();
        assert_eq!(
            store.table_url("players"),
            "https://db.example.com/rest/v1/players"
        );
    }
}
