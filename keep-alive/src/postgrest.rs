//! Sentinel store backed by the hosted database's PostgREST endpoint.

use crate::store::{NewSentinel, SentinelRecord, SentinelStore, StoreError};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, Response, Url,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// PostgREST code for "JSON object requested, multiple (or no) rows returned".
const NO_ROWS_CODE: &str = "PGRST116";

/// Asks PostgREST for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

pub struct PostgrestStore {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl PostgrestStore {
    pub fn new(
        client: Client,
        database_url: &str,
        table: &str,
        service_key: &str,
    ) -> anyhow::Result<Self> {
        let endpoint = format!("{}/rest/v1/{}", database_url.trim_end_matches('/'), table);
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid database URL '{}': {}", database_url, e))?;

        let mut api_key = HeaderValue::from_str(service_key).context("invalid service key")?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", service_key))
            .context("invalid service key")?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), api_key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        Ok(Self {
            client,
            endpoint,
            headers,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // `no_rows_is_not_found` is set only for updates; an insert keeps PostgREST's own message.
    async fn handle_response(
        response: Response,
        no_rows_is_not_found: bool,
    ) -> Result<SentinelRecord, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<PostgrestError>(&body) {
            Ok(err) if no_rows_is_not_found && err.code.as_deref() == Some(NO_ROWS_CODE) => {
                Err(StoreError::NotFound)
            }
            Ok(err) => {
                debug!("PostgREST error {:?} with status {}", err.code, status);
                Err(StoreError::Database {
                    code: err.code,
                    message: err
                        .message
                        .unwrap_or_else(|| format!("database responded with status {}", status)),
                })
            }
            Err(_) => Err(StoreError::Database {
                code: None,
                message: format!("database responded with status {}", status),
            }),
        }
    }
}

#[async_trait]
impl SentinelStore for PostgrestStore {
    async fn touch(&self, id: i64, at: &str) -> Result<SentinelRecord, StoreError> {
        let response = self
            .client
            .patch(self.endpoint.clone())
            .query(&[("id", format!("eq.{}", id))])
            .headers(self.headers.clone())
            .json(&json!({ "last_ping": at }))
            .send()
            .await?;
        Self::handle_response(response, true).await
    }

    async fn create(&self, row: &NewSentinel) -> Result<SentinelRecord, StoreError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(row)
            .send()
            .await?;
        Self::handle_response(response, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::patch,
        Json, Router,
    };
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    const KEY: &str = "service-role-key";

    fn authorized(headers: &AxumHeaders) -> bool {
        headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(KEY)
            && headers.get("authorization").and_then(|v| v.to_str().ok())
                == Some(&format!("Bearer {}", KEY)[..])
            && headers.get("accept").and_then(|v| v.to_str().ok()) == Some(SINGLE_OBJECT)
    }

    // Imitates PostgREST for a single-table schema holding at most one row.
    async fn spawn_mock_postgrest(row: Option<Value>) -> (String, Arc<Mutex<Option<Value>>>) {
        let table: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(row));
        let t1 = table.clone();
        let t2 = table.clone();

        let app = Router::new().route(
            "/rest/v1/keep_alive",
            patch(
                move |Query(q): Query<HashMap<String, String>>,
                      headers: AxumHeaders,
                      Json(body): Json<Value>| {
                    let table = t1.clone();
                    async move {
                        if !authorized(&headers) {
                            return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no key" })));
                        }
                        let mut table = table.lock().await;
                        match table.as_mut() {
                            Some(row) if q.get("id").map(String::as_str) == Some("eq.1") => {
                                row["last_ping"] = body["last_ping"].clone();
                                (StatusCode::OK, Json(row.clone()))
                            }
                            _ => (
                                StatusCode::NOT_ACCEPTABLE,
                                Json(json!({
                                    "code": "PGRST116",
                                    "details": "The result contains 0 rows",
                                    "hint": null,
                                    "message": "JSON object requested, multiple (or no) rows returned"
                                })),
                            ),
                        }
                    }
                },
            )
            .post(move |headers: AxumHeaders, Json(body): Json<Value>| {
                let table = t2.clone();
                async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no key" })));
                    }
                    let mut table = table.lock().await;
                    if table.is_some() {
                        return (
                            StatusCode::CONFLICT,
                            Json(json!({
                                "code": "23505",
                                "message": "duplicate key value violates unique constraint \"keep_alive_pkey\""
                            })),
                        );
                    }
                    *table = Some(body.clone());
                    (StatusCode::CREATED, Json(body))
                }
            }),
        );

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = axum::Server::from_tcp(listener)
            .expect("server")
            .serve(app.into_make_service());
        tokio::spawn(server);
        (format!("http://127.0.0.1:{}", addr.port()), table)
    }

    fn store(url: &str) -> PostgrestStore {
        PostgrestStore::new(Client::new(), url, "keep_alive", KEY).expect("store")
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let s = store("https://project.supabase.co/");
        assert_eq!(
            s.endpoint().as_str(),
            "https://project.supabase.co/rest/v1/keep_alive"
        );
    }

    #[test]
    fn rejects_invalid_database_url() {
        let err = PostgrestStore::new(Client::new(), "not a url", "keep_alive", KEY)
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("Invalid database URL"), "{}", err);
    }

    #[tokio::test]
    async fn touch_updates_existing_row() {
        let (url, table) = spawn_mock_postgrest(Some(json!({
            "id": 1,
            "Able to read DB": "Yes",
            "last_ping": "2026-01-01T00:00:00.000Z"
        })))
        .await;

        let rec = store(&url)
            .touch(1, "2026-10-18T09:00:00.000Z")
            .await
            .expect("touch");
        assert_eq!(rec.id, 1);
        assert_eq!(rec.last_ping.as_deref(), Some("2026-10-18T09:00:00.000Z"));

        let stored = table.lock().await.clone().expect("row");
        assert_eq!(stored["last_ping"], "2026-10-18T09:00:00.000Z");
    }

    #[tokio::test]
    async fn touch_without_row_is_not_found() {
        let (url, _table) = spawn_mock_postgrest(None).await;
        let err = store(&url)
            .touch(1, "2026-10-18T09:00:00.000Z")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound), "got {:?}", err);
    }

    #[tokio::test]
    async fn create_inserts_row() {
        let (url, table) = spawn_mock_postgrest(None).await;
        let rec = store(&url)
            .create(&NewSentinel::at("2026-10-18T09:00:00.000Z"))
            .await
            .expect("create");
        assert_eq!(rec.id, 1);
        assert_eq!(rec.able_to_read_db.as_deref(), Some("Yes"));
        assert!(table.lock().await.is_some());
    }

    #[tokio::test]
    async fn create_conflict_is_database_error() {
        let (url, _table) = spawn_mock_postgrest(Some(json!({ "id": 1 }))).await;
        let err = store(&url)
            .create(&NewSentinel::at("2026-10-18T09:00:00.000Z"))
            .await
            .unwrap_err();
        match err {
            StoreError::Database { code, message } => {
                assert_eq!(code.as_deref(), Some("23505"));
                assert!(message.starts_with("duplicate key"));
            }
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_key_surfaces_message() {
        let (url, _table) = spawn_mock_postgrest(None).await;
        let s = PostgrestStore::new(Client::new(), &url, "keep_alive", "wrong").expect("store");
        let err = s.touch(1, "2026-10-18T09:00:00.000Z").await.unwrap_err();
        assert_eq!(err.to_string(), "no key");
    }

    #[tokio::test]
    async fn non_json_error_reports_status() {
        let app = Router::new().route(
            "/rest/v1/keep_alive",
            patch(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = axum::Server::from_tcp(listener)
            .expect("server")
            .serve(app.into_make_service());
        tokio::spawn(server);

        let err = store(&format!("http://127.0.0.1:{}", addr.port()))
            .touch(1, "2026-10-18T09:00:00.000Z")
            .await
            .unwrap_err();
        match err {
            StoreError::Database { code: None, message } => assert!(message.contains("502")),
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn insert_no_rows_keeps_postgrest_message() {
        let app = Router::new().route(
            "/rest/v1/keep_alive",
            axum::routing::post(|| async {
                (
                    StatusCode::NOT_ACCEPTABLE,
                    Json(json!({
                        "code": "PGRST116",
                        "details": "The result contains 0 rows",
                        "hint": null,
                        "message": "JSON object requested, multiple (or no) rows returned"
                    })),
                )
            }),
        );
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = axum::Server::from_tcp(listener)
            .expect("server")
            .serve(app.into_make_service());
        tokio::spawn(server);

        let err = store(&format!("http://127.0.0.1:{}", addr.port()))
            .create(&NewSentinel::at("2026-10-18T09:00:00.000Z"))
            .await
            .unwrap_err();
        match err {
            StoreError::Database { code, message } => {
                assert_eq!(code.as_deref(), Some("PGRST116"));
                assert_eq!(message, "JSON object requested, multiple (or no) rows returned");
            }
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_database_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = store(&format!("http://127.0.0.1:{}", addr.port()))
            .touch(1, "2026-10-18T09:00:00.000Z")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)), "got {:?}", err);
    }
}
