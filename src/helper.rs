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

//! Test helpers: an in-process fake of the remote document database API.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::remote::PropertyTypes;
use crate::remote::RemotePage;

pub const TOKEN: &str = "secret_test_token";

#[derive(Default)]
pub struct FakeState {
    pub pages: Vec<RemotePage>,
    /// Database id to schema.
    pub schemas: HashMap<String, PropertyTypes>,
    pub page_size: usize,
    /// Statuses returned, in order, before requests are served normally.
    pub scripted_statuses: VecDeque<u16>,
    /// Queries after this many are rejected with a 400.
    pub reject_queries_after: Option<usize>,
    pub query_bodies: Vec<Value>,
    pub patches: Vec<(String, Value)>,
    pub created: Vec<Value>,
    pub requests: usize,
    pub unauthorized: usize,
}

pub type SharedState = Arc<Mutex<FakeState>>;

pub struct FakeNotion {
    pub base_url: String,
    pub state: SharedState,
}

impl FakeNotion {
    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

/// Starts the fake on an unused local port.
pub async fn start_fake_notion(state: FakeState) -> Fallible<FakeNotion> {
    let state: SharedState = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/databases/{id}", get(get_database))
        .route("/databases/{id}/query", post(query_database))
        .route("/pages", post(create_page))
        .route("/pages/{id}", patch(patch_page))
        .with_state(state.clone());
    let port = portpicker::pick_unused_port().ok_or_else(|| ErrorReport::new("no free port"))?;
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(FakeNotion {
        base_url: format!("http://127.0.0.1:{port}"),
        state,
    })
}

type Reply = (StatusCode, Json<Value>);

/// Counts the request, checks the headers, and pops a scripted status.
fn intercept(state: &mut FakeState, headers: &HeaderMap) -> Option<Reply> {
    state.requests += 1;
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    let versioned = headers.contains_key("notion-version");
    if !authorized || !versioned {
        state.unauthorized += 1;
        return Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "unauthorized" })),
        ));
    }
    let code = state.scripted_statuses.pop_front()?;
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, Json(json!({ "code": "scripted" }))))
}

async fn get_database(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    let mut state = state.lock().unwrap();
    if let Some(reply) = intercept(&mut state, &headers) {
        return reply;
    }
    match state.schemas.get(&id) {
        Some(types) => {
            let properties: serde_json::Map<String, Value> = types
                .iter()
                .map(|(name, ty)| (name.clone(), json!({ "id": name, "type": ty })))
                .collect();
            (
                StatusCode::OK,
                Json(json!({ "object": "database", "id": id, "properties": properties })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "object_not_found" })),
        ),
    }
}

async fn query_database(
    State(state): State<SharedState>,
    Path(_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = state.lock().unwrap();
    if let Some(reply) = intercept(&mut state, &headers) {
        return reply;
    }
    if let Some(limit) = state.reject_queries_after {
        if state.query_bodies.len() >= limit {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": "validation_error" })),
            );
        }
    }
    state.query_bodies.push(body.clone());
    let start: usize = body
        .get("start_cursor")
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let page_size = state.page_size.max(1);
    let end = (start + page_size).min(state.pages.len());
    let results: Vec<RemotePage> = state.pages[start.min(end)..end].to_vec();
    let has_more = end < state.pages.len();
    let next_cursor = if has_more {
        Value::String(end.to_string())
    } else {
        Value::Null
    };
    (
        StatusCode::OK,
        Json(json!({
            "object": "list",
            "results": results,
            "next_cursor": next_cursor,
            "has_more": has_more,
        })),
    )
}

async fn patch_page(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = state.lock().unwrap();
    if let Some(reply) = intercept(&mut state, &headers) {
        return reply;
    }
    let properties = body
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let Some(page) = state.pages.iter_mut().find(|p| p.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "object_not_found" })),
        );
    };
    for (name, value) in properties {
        page.properties.insert(name, value);
    }
    let page = json!(page);
    state.patches.push((id, body));
    (StatusCode::OK, Json(page))
}

async fn create_page(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = state.lock().unwrap();
    if let Some(reply) = intercept(&mut state, &headers) {
        return reply;
    }
    state.created.push(body);
    (
        StatusCode::OK,
        Json(json!({ "object": "page", "id": "task-1" })),
    )
}
