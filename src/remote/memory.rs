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

//! An in-memory store for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;

use crate::remote::CardStore;
use crate::remote::Properties;
use crate::remote::PropertyTypes;
use crate::remote::QueryFilter;
use crate::remote::QueryPage;
use crate::remote::RemoteError;
use crate::remote::RemotePage;
use crate::remote::TaskTracker;
use crate::types::date::Date;

/// The schema matching the default property names.
pub fn standard_schema() -> PropertyTypes {
    [
        ("Name", "title"),
        ("Stage", "number"),
        ("Ease", "number"),
        ("Interval", "number"),
        ("Last Review", "date"),
        ("Next Review", "date"),
        ("Status", "select"),
        ("Tags", "multi_select"),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty.to_string()))
    .collect()
}

/// Builds a record using the default property names.
#[allow(clippy::too_many_arguments)]
pub fn card_page(
    id: &str,
    title: &str,
    stage: u32,
    ease: f64,
    interval: u32,
    next_review: Option<&str>,
    status: &str,
    tags: &[&str],
) -> RemotePage {
    let next_review = match next_review {
        Some(date) => json!({ "start": date }),
        None => Value::Null,
    };
    let tags: Vec<Value> = tags.iter().map(|t| json!({ "name": t })).collect();
    let properties = json!({
        "Name": { "title": [ { "text": { "content": title } } ] },
        "Stage": { "number": stage },
        "Ease": { "number": ease },
        "Interval": { "number": interval },
        "Last Review": { "date": null },
        "Next Review": { "date": next_review },
        "Status": { "select": { "name": status } },
        "Tags": { "multi_select": tags },
    });
    RemotePage {
        id: id.to_string(),
        properties: properties.as_object().cloned().unwrap_or_default(),
    }
}

pub struct MemoryStore {
    pages: Mutex<Vec<RemotePage>>,
    schema: PropertyTypes,
    page_size: usize,
    /// Patching these ids is rejected.
    reject_patch: HashSet<String>,
    /// Queries after this many succeed fail.
    fail_query_after: Option<usize>,
    fail_tasks: bool,
    queries: Mutex<usize>,
    patches: Mutex<Vec<(String, Properties)>>,
    tasks: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new(pages: Vec<RemotePage>) -> Self {
        Self {
            pages: Mutex::new(pages),
            schema: standard_schema(),
            page_size: 100,
            reject_patch: HashSet::new(),
            fail_query_after: None,
            fail_tasks: false,
            queries: Mutex::new(0),
            patches: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn rejecting_patch(mut self, id: &str) -> Self {
        self.reject_patch.insert(id.to_string());
        self
    }

    pub fn failing_query_after(mut self, successes: usize) -> Self {
        self.fail_query_after = Some(successes);
        self
    }

    pub fn failing_tasks(mut self) -> Self {
        self.fail_tasks = true;
        self
    }

    pub fn page(&self, id: &str) -> Option<RemotePage> {
        let pages = self.pages.lock().unwrap();
        pages.iter().find(|p| p.id == id).cloned()
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    pub fn patches(&self) -> Vec<(String, Properties)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn tasks(&self) -> Vec<(String, String)> {
        self.tasks.lock().unwrap().clone()
    }
}

impl CardStore for MemoryStore {
    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError> {
        let mut queries = self.queries.lock().unwrap();
        if let Some(limit) = self.fail_query_after {
            if *queries >= limit {
                return Err(RemoteError::NoResponse { attempts: 3 });
            }
        }
        *queries += 1;
        let pages = self.pages.lock().unwrap();
        let matching: Vec<RemotePage> = pages
            .iter()
            .filter(|p| filter.is_none_or(|f| matches(f, &p.properties)))
            .cloned()
            .collect();
        let start: usize = match cursor {
            Some(c) => c.parse().map_err(|_| RemoteError::Rejected {
                status: 400,
                body: "bad cursor".to_string(),
            })?,
            None => 0,
        };
        let end = (start + self.page_size).min(matching.len());
        let results = matching[start.min(end)..end].to_vec();
        let next_cursor = if end < matching.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(QueryPage {
            results,
            next_cursor,
        })
    }

    async fn patch(&self, card_id: &str, properties: &Properties) -> Result<(), RemoteError> {
        if self.reject_patch.contains(card_id) {
            return Err(RemoteError::Rejected {
                status: 400,
                body: "validation_error".to_string(),
            });
        }
        let mut pages = self.pages.lock().unwrap();
        let Some(page) = pages.iter_mut().find(|p| p.id == card_id) else {
            return Err(RemoteError::Rejected {
                status: 404,
                body: "object_not_found".to_string(),
            });
        };
        for (name, value) in properties {
            page.properties.insert(name.clone(), value.clone());
        }
        self.patches
            .lock()
            .unwrap()
            .push((card_id.to_string(), properties.clone()));
        Ok(())
    }

    async fn get_schema(&self) -> Result<PropertyTypes, RemoteError> {
        Ok(self.schema.clone())
    }
}

impl TaskTracker for MemoryStore {
    async fn create_mastery_task(&self, card_id: &str, card_title: &str) -> Result<(), RemoteError> {
        if self.fail_tasks {
            return Err(RemoteError::NoResponse { attempts: 3 });
        }
        self.tasks
            .lock()
            .unwrap()
            .push((card_id.to_string(), card_title.to_string()));
        Ok(())
    }
}

/// Evaluates a filter the way the remote store would.
fn matches(filter: &QueryFilter, props: &Properties) -> bool {
    let date_of = |property: &str| {
        props
            .get(property)
            .and_then(|p| p.get("date"))
            .and_then(|d| d.get("start"))
            .and_then(Value::as_str)
            .and_then(Date::parse_lenient)
    };
    match filter {
        QueryFilter::DateIsEmpty { property } => date_of(property).is_none(),
        QueryFilter::DateOnOrBefore { property, date } => {
            date_of(property).is_some_and(|d| d <= *date)
        }
        QueryFilter::Or(filters) => filters.iter().any(|f| matches(f, props)),
    }
}
