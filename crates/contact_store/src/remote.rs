//! Hosted REST table contact store for multi-user mode.
//!
//! Rows live in a `contacts` table exposed through the service's REST API.
//! Every request is made on behalf of the signed-in user; without a session
//! the store refuses to do anything.

use std::sync::Arc;

use async_trait::async_trait;
use auth::{service_error_message, ServiceConfig, SessionAccess, SessionManager, API_KEY_HEADER};
use chrono::{DateTime, Utc};
use entities::{Contact, NewContact};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ContactStore, StoreError, StoreResult};

/// REST path of the contacts table.
pub const CONTACTS_TABLE_PATH: &str = "/rest/v1/contacts";

/// A row of the contacts table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub note: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub created_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            user_id: Some(row.user_id),
            name: row.name,
            city: row.city,
            country: row.country,
            note: row.note,
            lat: row.lat,
            lon: row.lon,
            created_at: row.created_at,
        }
    }
}

/// Insert payload; the backend assigns `id` and `created_at`.
#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    name: &'a str,
    city: &'a str,
    country: &'a str,
    note: Option<&'a str>,
    lat: f64,
    lon: f64,
}

/// Contact store backed by the hosted REST table.
#[derive(Debug, Clone)]
pub struct RemoteContactStore {
    config: ServiceConfig,
    session: Arc<SessionManager>,
    http_client: reqwest::Client,
}

impl RemoteContactStore {
    /// Creates a store that acts on behalf of `session`'s current user.
    pub fn new(config: ServiceConfig, session: Arc<SessionManager>) -> Self {
        Self {
            config,
            session,
            http_client: reqwest::Client::new(),
        }
    }

    async fn access(&self) -> StoreResult<SessionAccess> {
        self.session
            .access()
            .await
            .ok_or(StoreError::NotAuthenticated)
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        access: &SessionAccess,
    ) -> reqwest::RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", access.access_token))
    }

    async fn read_rows(response: reqwest::Response) -> StoreResult<Vec<ContactRow>> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Backend(service_error_message(status, &text)));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ContactStore for RemoteContactStore {
    async fn list(&self) -> StoreResult<Vec<Contact>> {
        let access = self.access().await?;
        let user_filter = format!("eq.{}", access.user_id);

        let request = self
            .http_client
            .get(self.config.endpoint(CONTACTS_TABLE_PATH))
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.desc"),
            ]);
        let response = self.authorized(request, &access).send().await?;
        let rows = Self::read_rows(response).await?;

        debug!(user_id = %access.user_id, count = rows.len(), "Loaded contacts");
        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn insert(&self, contact: NewContact) -> StoreResult<Contact> {
        let access = self.access().await?;
        let row = InsertRow {
            user_id: &access.user_id,
            name: &contact.name,
            city: &contact.city,
            country: &contact.country,
            note: contact.note.as_deref(),
            lat: contact.lat,
            lon: contact.lon,
        };

        let request = self
            .http_client
            .post(self.config.endpoint(CONTACTS_TABLE_PATH))
            .header("Prefer", "return=representation")
            .json(&row);
        let response = self.authorized(request, &access).send().await?;

        let stored = Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .map(Contact::from)
            .ok_or_else(|| StoreError::backend("Insert returned no row"))?;

        debug!(id = %stored.id, user_id = %access.user_id, "Stored contact");
        Ok(stored)
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use auth::MemoryAuthBackend;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value as JsonValue};

    use super::*;

    const API_KEY: &str = "anon-key";

    type Rows = Arc<Mutex<Vec<JsonValue>>>;

    /// Starts a stub REST table that only accepts requests with the anon key
    /// and a bearer token.
    async fn stub_table(rows: Rows) -> String {
        let list_rows = rows.clone();
        let app = Router::new().route(
            CONTACTS_TABLE_PATH,
            get(
                move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| {
                    let rows = list_rows.clone();
                    async move {
                        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some(API_KEY)
                            || headers.get("authorization").is_none()
                        {
                            return (
                                StatusCode::UNAUTHORIZED,
                                Json(json!({"message": "JWT expired"})),
                            );
                        }
                        let owner = params
                            .get("user_id")
                            .and_then(|f| f.strip_prefix("eq."))
                            .unwrap_or_default()
                            .to_string();
                        assert_eq!(params.get("order").map(String::as_str), Some("created_at.desc"));
                        let mut matching: Vec<JsonValue> = rows
                            .lock()
                            .unwrap()
                            .iter()
                            .filter(|r| r["user_id"] == owner.as_str())
                            .cloned()
                            .collect();
                        matching.reverse();
                        (StatusCode::OK, Json(JsonValue::Array(matching)))
                    }
                },
            )
            .post(move |headers: HeaderMap, Json(mut body): Json<JsonValue>| {
                let rows = rows.clone();
                async move {
                    if headers.get("prefer").and_then(|v| v.to_str().ok())
                        != Some("return=representation")
                    {
                        return (StatusCode::CREATED, Json(JsonValue::Array(vec![])));
                    }
                    if body["name"] == "Forbidden" {
                        return (
                            StatusCode::FORBIDDEN,
                            Json(json!({
                                "code": "42501",
                                "message": "new row violates row-level security policy for table \"contacts\""
                            })),
                        );
                    }
                    let mut rows = rows.lock().unwrap();
                    body["id"] = json!(format!("row-{}", rows.len() + 1));
                    body["created_at"] = json!(format!("2024-05-0{}T10:00:00+00:00", rows.len() + 1));
                    rows.push(body.clone());
                    (StatusCode::CREATED, Json(JsonValue::Array(vec![body])))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn signed_in_session() -> (Arc<SessionManager>, String) {
        let backend = Arc::new(MemoryAuthBackend::new());
        backend.add_account("ana@example.com", "secret-pw");
        let session = Arc::new(SessionManager::new(backend));
        let user = session.sign_in("ana@example.com", "secret-pw").await.unwrap();
        (session, user.id)
    }

    fn lisbon(name: &str) -> NewContact {
        NewContact {
            name: name.to_string(),
            city: "Lisbon".to_string(),
            country: "Portugal".to_string(),
            note: Some("Met at a conference".to_string()),
            lat: 38.7223,
            lon: -9.1393,
        }
    }

    #[tokio::test]
    async fn test_requires_session() {
        let session = Arc::new(SessionManager::new(Arc::new(MemoryAuthBackend::new())));
        // Unroutable address: any network call would fail with an HTTP error instead
        let store = RemoteContactStore::new(ServiceConfig::new("http://127.0.0.1:1", API_KEY), session);

        assert!(matches!(store.list().await, Err(StoreError::NotAuthenticated)));
        assert!(matches!(
            store.insert(lisbon("Jordan Lee")).await,
            Err(StoreError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_insert_returns_stored_row_and_list_is_scoped() {
        let rows: Rows = Arc::new(Mutex::new(vec![json!({
            "id": "someone-else",
            "user_id": "other-user",
            "name": "Hidden",
            "city": "Paris",
            "country": "France",
            "note": null,
            "lat": 48.85,
            "lon": 2.35,
            "created_at": "2024-01-01T00:00:00Z"
        })]));
        let url = stub_table(rows.clone()).await;
        let (session, user_id) = signed_in_session().await;
        let store = RemoteContactStore::new(ServiceConfig::new(&url, API_KEY), session);

        let first = store.insert(lisbon("Jordan Lee")).await.unwrap();
        let second = store.insert(lisbon("Ana")).await.unwrap();

        assert_eq!(first.id, "row-2");
        assert_eq!(first.user_id.as_deref(), Some(user_id.as_str()));
        assert_eq!(first.note.as_deref(), Some("Met at a conference"));

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn test_backend_message_is_verbatim() {
        let url = stub_table(Arc::new(Mutex::new(Vec::new()))).await;
        let (session, _) = signed_in_session().await;
        let store = RemoteContactStore::new(ServiceConfig::new(&url, API_KEY), session);

        let err = store.insert(lisbon("Forbidden")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "new row violates row-level security policy for table \"contacts\""
        );
    }

    #[tokio::test]
    async fn test_wrong_api_key_surfaces_message() {
        let url = stub_table(Arc::new(Mutex::new(Vec::new()))).await;
        let (session, _) = signed_in_session().await;
        let store = RemoteContactStore::new(ServiceConfig::new(&url, "wrong-key"), session);

        let err = store.list().await.unwrap_err();
        assert_eq!(err.to_string(), "JWT expired");
    }

    #[tokio::test]
    async fn test_sign_out_stops_access() {
        let url = stub_table(Arc::new(Mutex::new(Vec::new()))).await;
        let (session, _) = signed_in_session().await;
        let store = RemoteContactStore::new(ServiceConfig::new(&url, API_KEY), session.clone());

        assert!(store.list().await.unwrap().is_empty());
        session.sign_out().await;
        assert!(matches!(store.list().await, Err(StoreError::NotAuthenticated)));
    }
}
