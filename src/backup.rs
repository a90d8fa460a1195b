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

//! Pre-update snapshots, and replaying them.

use std::collections::HashSet;
use std::fs::create_dir_all;
use std::fs::read_dir;
use std::fs::read_to_string;
use std::fs::remove_file;
use std::fs::rename;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Fallible;
use crate::error::fail;
use crate::remote::CardStore;
use crate::remote::Properties;
use crate::types::date::Date;

const PREFIX: &str = "review_backup_";
const SUFFIX: &str = ".json";

/// A card's properties as they were before a run changed them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub id: String,
    pub properties: Properties,
}

/// A directory of dated backup files, one per run date.
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: Date) -> PathBuf {
        self.dir.join(format!("{PREFIX}{date}{SUFFIX}"))
    }

    /// Writes the run's snapshots. If a file for the same date exists, its
    /// entries are kept and only cards it does not cover are added, so the
    /// file always holds the earliest snapshot of the day. An unreadable
    /// same-day file is moved aside rather than merged.
    pub fn write(&self, date: Date, entries: &[BackupEntry]) -> Fallible<Option<PathBuf>> {
        if entries.is_empty() {
            log::debug!("No backup entries to write.");
            return Ok(None);
        }
        let path = self.path_for(date);
        let mut merged = if path.exists() {
            match Self::read(&path) {
                Ok(existing) => existing,
                Err(e) => {
                    let aside = self.dir.join(format!("{PREFIX}{date}.corrupt"));
                    log::warn!(
                        "Unreadable backup {} ({e}), moving it to {}.",
                        path.display(),
                        aside.display()
                    );
                    rename(&path, &aside)?;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let mut seen: HashSet<String> = merged.iter().map(|e| e.id.clone()).collect();
        for entry in entries {
            if seen.insert(entry.id.clone()) {
                merged.push(entry.clone());
            }
        }
        create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(&merged)?)?;
        log::info!("Backed up {} cards to {}.", merged.len(), path.display());
        Ok(Some(path))
    }

    /// Reads a backup file. Malformed entries are skipped.
    pub fn read(path: &Path) -> Fallible<Vec<BackupEntry>> {
        if !path.exists() {
            return fail(format!("backup file not found: {}", path.display()));
        }
        let raw: Vec<Value> = serde_json::from_str(&read_to_string(path)?)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<BackupEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping malformed backup entry {index}: {e}"),
            }
        }
        Ok(entries)
    }

    /// Deletes backups older than `retain_days`, then all but the newest
    /// `retain_max`. Returns the deleted paths.
    pub fn prune(&self, today: Date, retain_days: i64, retain_max: usize) -> Fallible<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups: Vec<(i64, PathBuf)> = Vec::new();
        for entry in read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stamp) = name
                .strip_prefix(PREFIX)
                .and_then(|rest| rest.strip_suffix(SUFFIX))
            else {
                continue;
            };
            let age = Date::parse_lenient(stamp)
                .map(|date| today.days_since(date))
                .unwrap_or(0);
            backups.push((age, path));
        }
        // Newest first.
        backups.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let mut removed = Vec::new();
        let mut kept = 0;
        for (age, path) in backups {
            if age > retain_days || kept >= retain_max {
                remove_file(&path)?;
                log::debug!("Pruned backup {}.", path.display());
                removed.push(path);
            } else {
                kept += 1;
            }
        }
        Ok(removed)
    }
}

/// The result of a rollback.
#[derive(Debug, Default, PartialEq)]
pub struct RollbackReport {
    pub restored: usize,
    pub failed: usize,
}

/// Overwrites cards with their backed-up properties, whatever their current
/// state.
pub struct RollbackRunner<'a, S: CardStore> {
    store: &'a S,
    dry_run: bool,
}

impl<'a, S: CardStore> RollbackRunner<'a, S> {
    pub fn new(store: &'a S, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub async fn run(&self, entries: &[BackupEntry]) -> RollbackReport {
        let mut report = RollbackReport::default();
        for entry in entries {
            if self.dry_run {
                println!(
                    "[dry-run] restore {}: {}",
                    entry.id,
                    Value::Object(entry.properties.clone())
                );
                report.restored += 1;
                continue;
            }
            match self.store.patch(&entry.id, &entry.properties).await {
                Ok(()) => {
                    log::debug!("Restored {}.", entry.id);
                    report.restored += 1;
                }
                Err(e) => {
                    log::warn!("Could not restore {}: {e}", entry.id);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
