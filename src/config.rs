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

use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;
use crate::types::card::CardStatus;

const TOKEN_VARS: [&str; 2] = ["NOTION_TOKEN", "NOTION_API_KEY"];

const REVIEW_DB_VAR: &str = "NOTION_REVIEW_DB_ID";

/// Run configuration, read from a TOML file. Every field has a default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub review_db_id: String,
    pub tasks_db_id: Option<String>,
    pub api_base_url: String,
    pub api_version: String,
    pub rate_limit_per_sec: u32,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub page_size: u32,
    /// Paging stops after this many pages even if the cursor continues.
    pub max_pages: u32,
    pub backup_dir: PathBuf,
    pub stats_path: PathBuf,
    pub stats_mirror_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub history_limit: usize,
    pub backup_retain_days: i64,
    pub backup_retain_max: usize,
    pub properties: PropertyNames,
    pub status_labels: StatusLabels,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            review_db_id: String::new(),
            tasks_db_id: None,
            api_base_url: "https://api.notion.com/v1".to_string(),
            api_version: "2022-06-28".to_string(),
            rate_limit_per_sec: 3,
            max_attempts: 3,
            request_timeout_secs: 30,
            page_size: 100,
            max_pages: 50,
            backup_dir: PathBuf::from("analytics"),
            stats_path: PathBuf::from("analytics/review_stats.json"),
            stats_mirror_path: Some(PathBuf::from("docs/analytics/review_stats.json")),
            history_path: Some(PathBuf::from("docs/analytics/history.json")),
            history_limit: 180,
            backup_retain_days: 30,
            backup_retain_max: 50,
            properties: PropertyNames::default(),
            status_labels: StatusLabels::default(),
        }
    }
}

/// The names of the card properties. The title property is detected by type
/// and so is not listed here.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertyNames {
    pub stage: String,
    pub ease: String,
    pub interval: String,
    pub last_review: String,
    pub next_review: String,
    pub status: String,
    pub tags: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            stage: "Stage".to_string(),
            ease: "Ease".to_string(),
            interval: "Interval".to_string(),
            last_review: "Last Review".to_string(),
            next_review: "Next Review".to_string(),
            status: "Status".to_string(),
            tags: "Tags".to_string(),
        }
    }
}

/// The remote select option for each card status.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusLabels {
    pub new: String,
    pub reviewing: String,
    pub reset: String,
    pub mastered: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            new: "New".to_string(),
            reviewing: "Reviewing".to_string(),
            reset: "Reset".to_string(),
            mastered: "Mastered".to_string(),
        }
    }
}

impl StatusLabels {
    pub fn label(&self, status: CardStatus) -> &str {
        match status {
            CardStatus::New => &self.new,
            CardStatus::Reviewing => &self.reviewing,
            CardStatus::Reset => &self.reset,
            CardStatus::Mastered => &self.mastered,
        }
    }

    pub fn parse(&self, label: &str) -> Option<CardStatus> {
        [
            CardStatus::New,
            CardStatus::Reviewing,
            CardStatus::Reset,
            CardStatus::Mastered,
        ]
        .into_iter()
        .find(|status| self.label(*status) == label)
    }
}

impl Config {
    /// Loads the config file, or the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> Fallible<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return fail(format!("config file not found: {}", path.display()));
                }
                log::debug!("Loading config from {}.", path.display());
                let content = read_to_string(path)?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Fallible<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// The identifiers and secret a run needs before any remote call.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub token: String,
    pub review_db_id: String,
    pub tasks_db_id: Option<String>,
}

impl Credentials {
    /// Resolves credentials from the config, falling back to the
    /// environment (read through `env`).
    pub fn resolve(config: &Config, env: impl Fn(&str) -> Option<String>) -> Fallible<Self> {
        let configured = config.review_db_id.trim();
        let review_db_id = if configured.is_empty() || is_placeholder(configured) {
            env(REVIEW_DB_VAR).unwrap_or_default().trim().to_string()
        } else {
            configured.to_string()
        };
        if review_db_id.is_empty() {
            return fail(format!(
                "review_db_id missing (set it in the config or {REVIEW_DB_VAR})"
            ));
        }
        let token = TOKEN_VARS
            .iter()
            .filter_map(|var| env(var))
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty());
        let token = match token {
            Some(token) => token,
            None => return fail("API token missing (set NOTION_TOKEN or NOTION_API_KEY)"),
        };
        let tasks_db_id = config
            .tasks_db_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !is_placeholder(id))
            .map(str::to_string);
        Ok(Self {
            token,
            review_db_id,
            tasks_db_id,
        })
    }

    /// Reads the process environment.
    pub fn from_env(config: &Config) -> Fallible<Self> {
        Self::resolve(config, |var| std::env::var(var).ok())
    }
}

fn is_placeholder(value: &str) -> bool {
    value.to_uppercase().starts_with("REPLACE")
}
