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

//! Maps between remote records and cards. Property names vary between
//! databases; property types do not.

use serde_json::Value;
use serde_json::json;

use crate::config::PropertyNames;
use crate::config::StatusLabels;
use crate::error::Fallible;
use crate::error::fail;
use crate::remote::Properties;
use crate::remote::PropertyTypes;
use crate::remote::QueryFilter;
use crate::remote::RemotePage;
use crate::schedule::MIN_EASE;
use crate::schedule::NextState;
use crate::types::card::CardStatus;
use crate::types::card::DEFAULT_EASE;
use crate::types::card::DEFAULT_INTERVAL;
use crate::types::card::ReviewCard;
use crate::types::date::Date;

const TITLE: &str = "title";
const NUMBER: &str = "number";
const DATE: &str = "date";
const SELECT: &str = "select";
const MULTI_SELECT: &str = "multi_select";
const RELATION: &str = "relation";

/// The resolved property names of the card database, fixed for a run.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaMapping {
    pub title: String,
    pub stage: String,
    pub ease: String,
    pub interval: String,
    pub last_review: String,
    pub next_review: String,
    pub status: String,
    /// `None` if the database has no tags property.
    pub tags: Option<String>,
    labels: StatusLabels,
}

impl SchemaMapping {
    /// Resolves the configured names against the database schema.
    pub fn resolve(
        types: &PropertyTypes,
        names: &PropertyNames,
        labels: &StatusLabels,
    ) -> Fallible<Self> {
        let title = match types.iter().find(|(_, ty)| ty.as_str() == TITLE) {
            Some((name, _)) => name.clone(),
            None => return fail("card database has no title property"),
        };
        let tags = match find_property(types, &names.tags, MULTI_SELECT) {
            Ok(name) => Some(name),
            Err(e) => {
                log::warn!("Tag filtering unavailable: {e}");
                None
            }
        };
        Ok(Self {
            title,
            stage: find_property(types, &names.stage, NUMBER)?,
            ease: find_property(types, &names.ease, NUMBER)?,
            interval: find_property(types, &names.interval, NUMBER)?,
            last_review: find_property(types, &names.last_review, DATE)?,
            next_review: find_property(types, &names.next_review, DATE)?,
            status: find_property(types, &names.status, SELECT)?,
            tags,
            labels: labels.clone(),
        })
    }

    /// The server-side filter for due cards.
    pub fn due_filter(&self, today: Date) -> QueryFilter {
        QueryFilter::due(&self.next_review, today)
    }

    /// Reads a card out of a record, substituting defaults for missing or
    /// malformed values.
    pub fn decode(&self, page: &RemotePage) -> ReviewCard {
        let props = &page.properties;
        let stage = number(props, &self.stage)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(0);
        let ease = number(props, &self.ease)
            .map(|n| n.max(MIN_EASE))
            .unwrap_or(DEFAULT_EASE);
        let interval = number(props, &self.interval)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_INTERVAL);
        let status = match select(props, &self.status) {
            Some(label) => self.labels.parse(&label).unwrap_or_else(|| {
                log::debug!("Unknown status {label:?} on card {}.", page.id);
                CardStatus::New
            }),
            None => CardStatus::New,
        };
        let tags = match &self.tags {
            Some(name) => multi_select(props, name).into_iter().collect(),
            None => Default::default(),
        };
        ReviewCard {
            id: page.id.clone(),
            title: title_text(props, &self.title),
            stage,
            ease,
            interval,
            last_review: date(props, &self.last_review),
            next_review: date(props, &self.next_review),
            status,
            tags,
        }
    }

    /// The single patch that applies a scheduling decision.
    pub fn encode_update(&self, next: &NextState, today: Date) -> Properties {
        let mut props = Properties::new();
        props.insert(self.stage.clone(), json!({ "number": next.stage }));
        props.insert(self.ease.clone(), json!({ "number": next.ease }));
        props.insert(self.interval.clone(), json!({ "number": next.interval }));
        props.insert(
            self.last_review.clone(),
            json!({ "date": { "start": today.to_string() } }),
        );
        props.insert(
            self.next_review.clone(),
            json!({ "date": { "start": next.next_date.to_string() } }),
        );
        props.insert(
            self.status.clone(),
            json!({ "select": { "name": self.labels.label(next.status) } }),
        );
        props
    }

    /// The card's scheduling properties as they are now, in patch form, so
    /// that replaying the snapshot restores them. Missing values become
    /// explicit nulls.
    pub fn snapshot(&self, page: &RemotePage) -> Properties {
        let props = &page.properties;
        let mut snap = Properties::new();
        for name in [&self.stage, &self.ease, &self.interval] {
            let value = props.get(name).and_then(|p| p.get(NUMBER)).cloned();
            snap.insert(name.clone(), json!({ "number": value.unwrap_or(Value::Null) }));
        }
        for name in [&self.last_review, &self.next_review] {
            let value = props
                .get(name)
                .and_then(|p| p.get(DATE))
                .and_then(|d| d.get("start"))
                .and_then(Value::as_str)
                .map(|start| json!({ "start": start }));
            snap.insert(name.clone(), json!({ "date": value.unwrap_or(Value::Null) }));
        }
        let value = select(props, &self.status).map(|name| json!({ "name": name }));
        snap.insert(
            self.status.clone(),
            json!({ "select": value.unwrap_or(Value::Null) }),
        );
        snap
    }
}

/// The property layout of the task tracker database.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskSchema {
    pub title: String,
    pub status: String,
    pub relation: String,
}

impl Default for TaskSchema {
    fn default() -> Self {
        Self {
            title: "Name".to_string(),
            status: "Status".to_string(),
            relation: "Review Card".to_string(),
        }
    }
}

impl TaskSchema {
    /// Detects the title, status and relation properties, keeping the
    /// defaults for any that cannot be found.
    pub fn resolve(types: &PropertyTypes) -> Self {
        let mut schema = Self::default();
        if let Some((name, _)) = types.iter().find(|(_, ty)| ty.as_str() == TITLE) {
            schema.title = name.clone();
        }
        let status_names = ["status", "状态", "task status", "任务状态"];
        if let Some((name, _)) = types.iter().find(|(name, ty)| {
            ty.as_str() == SELECT && status_names.contains(&name.to_lowercase().as_str())
        }) {
            schema.status = name.clone();
        }
        if let Some((name, _)) = types.iter().find(|(_, ty)| ty.as_str() == RELATION) {
            schema.relation = name.clone();
        }
        schema
    }

    /// The properties of a task recording that a card was mastered.
    pub fn mastery_task(&self, card_id: &str, card_title: &str) -> Properties {
        let mut props = Properties::new();
        props.insert(
            self.title.clone(),
            json!({ "title": [ { "text": { "content": format!("Review mastered: {card_title}") } } ] }),
        );
        props.insert(
            self.relation.clone(),
            json!({ "relation": [ { "id": card_id } ] }),
        );
        props.insert(self.status.clone(), json!({ "select": { "name": "Done" } }));
        props
    }
}

/// Finds a property by exact name, then case-insensitively, and checks its
/// type.
fn find_property(types: &PropertyTypes, wanted: &str, expected: &str) -> Fallible<String> {
    let found = types.get_key_value(wanted).or_else(|| {
        types
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted.to_lowercase())
    });
    match found {
        Some((name, ty)) if ty == expected => Ok(name.clone()),
        Some((name, ty)) => fail(format!(
            "property {name:?} has type {ty}, expected {expected}"
        )),
        None => fail(format!("card database has no {expected} property named {wanted:?}")),
    }
}

fn number(props: &Properties, name: &str) -> Option<f64> {
    props
        .get(name)?
        .get(NUMBER)?
        .as_f64()
        .filter(|n| n.is_finite())
}

fn date(props: &Properties, name: &str) -> Option<Date> {
    let start = props.get(name)?.get(DATE)?.get("start")?.as_str()?;
    Date::parse_lenient(start)
}

fn select(props: &Properties, name: &str) -> Option<String> {
    let name = props.get(name)?.get(SELECT)?.get("name")?.as_str()?;
    Some(name.to_string())
}

fn multi_select(props: &Properties, name: &str) -> Vec<String> {
    props
        .get(name)
        .and_then(|p| p.get(MULTI_SELECT))
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Concatenates the text segments of a title. Segments may carry either
/// `plain_text` (as read) or `text.content` (as written).
fn title_text(props: &Properties, name: &str) -> String {
    let Some(segments) = props
        .get(name)
        .and_then(|p| p.get(TITLE))
        .and_then(Value::as_array)
    else {
        return String::new();
    };
    segments
        .iter()
        .filter_map(|segment| {
            segment
                .get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| {
                    segment
                        .get("text")
                        .and_then(|t| t.get("content"))
                        .and_then(Value::as_str)
                })
        })
        .collect()
}
