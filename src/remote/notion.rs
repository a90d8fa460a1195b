// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client for the Notion API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::config::Config;
use crate::error::Fallible;
use crate::remote::CardStore;
use crate::remote::Properties;
use crate::remote::PropertyTypes;
use crate::remote::QueryFilter;
use crate::remote::QueryPage;
use crate::remote::RemoteError;
use crate::remote::RemotePage;
use crate::remote::TaskTracker;
use crate::remote::limiter::RateLimiter;
use crate::remote::retry::Outcome;
use crate::remote::retry::RetryPolicy;
use crate::remote::schema::TaskSchema;

/// Rejection bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 300;

/// Sends paced, retried requests to the API. Every call made through one
/// client shares its rate limiter.
pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
    api_version: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl NotionClient {
    pub fn from_config(config: &Config, token: String) -> Fallible<Self> {
        Self::new(
            &config.api_base_url,
            token,
            &config.api_version,
            Duration::from_secs(config.request_timeout_secs),
            RateLimiter::per_second(config.rate_limit_per_sec),
            RetryPolicy::new(config.max_attempts, Duration::from_secs(1)),
        )
    }

    pub fn new(
        base_url: &str,
        token: String,
        api_version: &str,
        timeout: Duration,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Fallible<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            api_version: api_version.to_string(),
            limiter,
            retry,
        })
    }

    /// Sends a request and decodes the JSON response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let url = format!("{}/{}", self.base_url, path);
        let payload: Option<Vec<u8>> = match body {
            Some(body) => {
                Some(serde_json::to_vec(body).map_err(|e| RemoteError::Malformed(e.to_string()))?)
            }
            None => None,
        };
        log::debug!("{method} {url}");
        let outcome = self
            .retry
            .execute(|| {
                let request = self.request(method.clone(), &url, payload.as_deref());
                async move {
                    self.limiter.acquire().await;
                    request.send().await
                }
            })
            .await;
        match outcome {
            Outcome::Success(response) => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))
            }
            Outcome::Rejected(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Rejected {
                    status,
                    body: body.chars().take(MAX_ERROR_BODY).collect(),
                })
            }
            Outcome::NoResponse { attempts } => Err(RemoteError::NoResponse { attempts }),
        }
    }

    fn request(&self, method: Method, url: &str, payload: Option<&[u8]>) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version);
        match payload {
            Some(bytes) => request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.to_vec()),
            None => request,
        }
    }

    /// Fetches a database's property names and types.
    pub async fn database_schema(&self, database_id: &str) -> Result<PropertyTypes, RemoteError> {
        let value = self
            .send(Method::GET, &format!("databases/{database_id}"), None)
            .await?;
        let Some(properties) = value.get("properties").and_then(Value::as_object) else {
            return Err(RemoteError::Malformed(
                "database has no properties".to_string(),
            ));
        };
        Ok(properties
            .iter()
            .filter_map(|(name, meta)| {
                let ty = meta.get("type").and_then(Value::as_str)?;
                Some((name.clone(), ty.to_string()))
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<RemotePage>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// The card database.
pub struct NotionStore {
    client: Arc<NotionClient>,
    database_id: String,
    page_size: u32,
}

impl NotionStore {
    pub fn new(client: Arc<NotionClient>, database_id: String, page_size: u32) -> Self {
        Self {
            client,
            database_id,
            page_size: page_size.clamp(1, 100),
        }
    }
}

impl CardStore for NotionStore {
    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError> {
        let mut body = json!({ "page_size": self.page_size });
        if let Some(filter) = filter {
            body["filter"] = filter.to_json();
        }
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        let path = format!("databases/{}/query", self.database_id);
        let value = self.client.send(Method::POST, &path, Some(&body)).await?;
        let response: QueryResponse =
            serde_json::from_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        Ok(QueryPage {
            results: response.results,
            next_cursor: response.next_cursor,
        })
    }

    async fn patch(&self, card_id: &str, properties: &Properties) -> Result<(), RemoteError> {
        let body = json!({ "properties": properties });
        self.client
            .send(Method::PATCH, &format!("pages/{card_id}"), Some(&body))
            .await?;
        Ok(())
    }

    async fn get_schema(&self) -> Result<PropertyTypes, RemoteError> {
        self.client.database_schema(&self.database_id).await
    }
}

/// The task database that records mastered cards.
pub struct NotionTasks {
    client: Arc<NotionClient>,
    database_id: String,
    schema: TaskSchema,
}

impl NotionTasks {
    /// Introspects the task database. Falls back to the default property
    /// names if the schema cannot be read.
    pub async fn connect(client: Arc<NotionClient>, database_id: String) -> Self {
        let schema = match client.database_schema(&database_id).await {
            Ok(types) => TaskSchema::resolve(&types),
            Err(e) => {
                log::warn!("Could not read the task database schema, using defaults: {e}");
                TaskSchema::default()
            }
        };
        log::debug!("Task schema: {schema:?}");
        Self {
            client,
            database_id,
            schema,
        }
    }
}

impl TaskTracker for NotionTasks {
    async fn create_mastery_task(&self, card_id: &str, card_title: &str) -> Result<(), RemoteError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": self.schema.mastery_task(card_id, card_title),
        });
        self.client.send(Method::POST, "pages", Some(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::ErrorReport;
    use crate::helper::FakeNotion;
    use crate::helper::FakeState;
    use crate::helper::TOKEN;
    use crate::helper::start_fake_notion;
    use crate::remote::memory::card_page;
    use crate::remote::memory::standard_schema;

    fn client(fake: &FakeNotion) -> Fallible<Arc<NotionClient>> {
        let client = NotionClient::new(
            &fake.base_url,
            TOKEN.to_string(),
            "2022-06-28",
            Duration::from_secs(5),
            RateLimiter::per_second(100),
            RetryPolicy::new(3, Duration::from_millis(10)),
        )?;
        Ok(Arc::new(client))
    }

    fn fake_state(count: usize, page_size: usize) -> FakeState {
        let pages = (0..count)
            .map(|i| card_page(&format!("card-{i}"), &format!("Card {i}"), 0, 2.5, 0, None, "New", &[]))
            .collect();
        let mut schemas = std::collections::HashMap::new();
        schemas.insert("reviews".to_string(), standard_schema());
        FakeState {
            pages,
            schemas,
            page_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_query_follows_cursor() -> Fallible<()> {
        let fake = start_fake_notion(fake_state(3, 2)).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 2);
        let filter = QueryFilter::due("Next Review", "2025-01-10".parse()?);

        let first = store.query(Some(&filter), None).await?;
        assert_eq!(first.results.len(), 2);
        assert_eq!(first.results[0].id, "card-0");
        let cursor = first.next_cursor.ok_or_else(|| ErrorReport::new("no cursor"))?;

        let second = store.query(Some(&filter), Some(&cursor)).await?;
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].id, "card-2");
        assert_eq!(second.next_cursor, None);

        let state = fake.state();
        assert_eq!(state.unauthorized, 0);
        assert_eq!(state.query_bodies.len(), 2);
        assert_eq!(state.query_bodies[0]["page_size"], json!(2));
        assert_eq!(state.query_bodies[0]["filter"], filter.to_json());
        assert_eq!(state.query_bodies[0].get("start_cursor"), None);
        assert_eq!(state.query_bodies[1]["start_cursor"], json!(cursor));
        Ok(())
    }

    #[tokio::test]
    async fn test_patch_sends_properties() -> Fallible<()> {
        let fake = start_fake_notion(fake_state(1, 10)).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 10);
        let mut props = Properties::new();
        props.insert("Stage".to_string(), json!({ "number": 1 }));
        store.patch("card-0", &props).await?;

        let state = fake.state();
        assert_eq!(state.patches.len(), 1);
        assert_eq!(state.patches[0].0, "card-0");
        assert_eq!(state.patches[0].1, json!({ "properties": { "Stage": { "number": 1 } } }));
        assert_eq!(state.pages[0].properties["Stage"], json!({ "number": 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_patch_unknown_card_is_rejected_without_retry() -> Fallible<()> {
        let fake = start_fake_notion(fake_state(1, 10)).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 10);
        let result = store.patch("missing", &Properties::new()).await;
        match result {
            Err(RemoteError::Rejected { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("object_not_found"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(fake.state().requests, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_statuses_are_retried() -> Fallible<()> {
        let mut state = fake_state(1, 10);
        state.scripted_statuses = VecDeque::from([429, 503]);
        let fake = start_fake_notion(state).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 10);
        let page = store.query(None, None).await?;
        assert_eq!(page.results.len(), 1);
        assert_eq!(fake.state().requests, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_no_response() -> Fallible<()> {
        let mut state = fake_state(1, 10);
        state.scripted_statuses = VecDeque::from([500, 500, 500, 500]);
        let fake = start_fake_notion(state).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 10);
        let result = store.query(None, None).await;
        assert!(matches!(result, Err(RemoteError::NoResponse { attempts: 3 })));
        assert_eq!(fake.state().requests, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_server_is_no_response() -> Fallible<()> {
        let port = portpicker::pick_unused_port().ok_or_else(|| ErrorReport::new("no port"))?;
        let client = NotionClient::new(
            &format!("http://127.0.0.1:{port}"),
            TOKEN.to_string(),
            "2022-06-28",
            Duration::from_secs(1),
            RateLimiter::per_second(100),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )?;
        let store = NotionStore::new(Arc::new(client), "reviews".to_string(), 10);
        let result = store.get_schema().await;
        assert_eq!(result, Err(RemoteError::NoResponse { attempts: 2 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_schema() -> Fallible<()> {
        let fake = start_fake_notion(fake_state(0, 10)).await?;
        let store = NotionStore::new(client(&fake)?, "reviews".to_string(), 10);
        assert_eq!(store.get_schema().await?, standard_schema());
        Ok(())
    }

    #[tokio::test]
    async fn test_tasks_use_introspected_schema() -> Fallible<()> {
        let mut state = fake_state(0, 10);
        let mut task_types = PropertyTypes::new();
        task_types.insert("Task".to_string(), "title".to_string());
        task_types.insert("Status".to_string(), "select".to_string());
        task_types.insert("Card".to_string(), "relation".to_string());
        state.schemas.insert("tasks".to_string(), task_types);
        let fake = start_fake_notion(state).await?;

        let tasks = NotionTasks::connect(client(&fake)?, "tasks".to_string()).await;
        tasks.create_mastery_task("card-7", "Traits").await?;

        let state = fake.state();
        assert_eq!(state.created.len(), 1);
        let created = &state.created[0];
        assert_eq!(created["parent"], json!({ "database_id": "tasks" }));
        assert_eq!(
            created["properties"]["Task"]["title"][0]["text"]["content"],
            json!("Review mastered: Traits")
        );
        assert_eq!(created["properties"]["Card"], json!({ "relation": [ { "id": "card-7" } ] }));
        Ok(())
    }

    #[tokio::test]
    async fn test_tasks_fall_back_to_default_schema() -> Fallible<()> {
        let fake = start_fake_notion(fake_state(0, 10)).await?;
        let tasks = NotionTasks::connect(client(&fake)?, "unknown".to_string()).await;
        assert_eq!(tasks.schema, TaskSchema::default());
        Ok(())
    }
}
