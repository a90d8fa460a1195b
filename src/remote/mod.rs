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

//! The boundary to the remote document database that owns the cards.

pub mod limiter;
#[cfg(test)]
pub mod memory;
pub mod notion;
pub mod retry;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::types::date::Date;

/// A page's properties, keyed by property name.
pub type Properties = serde_json::Map<String, Value>;

/// A database schema: property name to property type (`number`, `date`,
/// `select`, `multi_select`, `title`, `relation`, ...).
pub type PropertyTypes = BTreeMap<String, String>;

/// A record as the remote store returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemotePage {
    pub id: String,
    #[serde(default)]
    pub properties: Properties,
}

/// One page of query results.
#[derive(Debug)]
pub struct QueryPage {
    pub results: Vec<RemotePage>,
    /// Opaque continuation cursor. `None` once exhausted.
    pub next_cursor: Option<String>,
}

/// A server-side query filter over date properties.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryFilter {
    DateIsEmpty { property: String },
    DateOnOrBefore { property: String, date: Date },
    Or(Vec<QueryFilter>),
}

impl QueryFilter {
    /// Matches records whose date property is unset or on or before `today`.
    pub fn due(property: &str, today: Date) -> Self {
        QueryFilter::Or(vec![
            QueryFilter::DateIsEmpty {
                property: property.to_string(),
            },
            QueryFilter::DateOnOrBefore {
                property: property.to_string(),
                date: today,
            },
        ])
    }

    /// The wire representation.
    pub fn to_json(&self) -> Value {
        match self {
            QueryFilter::DateIsEmpty { property } => json!({
                "property": property,
                "date": { "is_empty": true },
            }),
            QueryFilter::DateOnOrBefore { property, date } => json!({
                "property": property,
                "date": { "on_or_before": date.to_string() },
            }),
            QueryFilter::Or(filters) => json!({
                "or": filters.iter().map(QueryFilter::to_json).collect::<Vec<_>>(),
            }),
        }
    }
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// No usable response: transport failures, or transient statuses on
    /// every attempt.
    NoResponse { attempts: u32 },
    /// The store answered with a non-retryable status.
    Rejected { status: u16, body: String },
    /// A successful response whose body could not be understood.
    Malformed(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::NoResponse { attempts } => {
                write!(f, "no response after {attempts} attempts")
            }
            RemoteError::Rejected { status, body } => {
                write!(f, "request rejected with status {status}: {body}")
            }
            RemoteError::Malformed(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

/// The store that holds review cards.
#[allow(async_fn_in_trait)]
pub trait CardStore {
    /// Fetch one page of cards matching `filter`, continuing from `cursor`.
    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError>;

    /// Overwrite the named properties of a card. Other properties are left
    /// alone.
    async fn patch(&self, card_id: &str, properties: &Properties) -> Result<(), RemoteError>;

    /// Fetch the card database's schema.
    async fn get_schema(&self) -> Result<PropertyTypes, RemoteError>;
}

/// The task tracker that is told about mastered cards.
#[allow(async_fn_in_trait)]
pub trait TaskTracker {
    async fn create_mastery_task(&self, card_id: &str, card_title: &str)
    -> Result<(), RemoteError>;
}
