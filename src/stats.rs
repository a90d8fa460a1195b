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

use std::collections::BTreeMap;
use std::fs::create_dir_all;
use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;
use crate::error::Fallible;
use crate::schedule::NextState;
use crate::types::date::Date;

/// Running totals for one review run.
#[derive(Default)]
pub struct StatsAggregator {
    processed: usize,
    updated: usize,
    failed: usize,
    due_count: usize,
    skipped_not_due: usize,
    ease_before_sum: f64,
    ease_after_sum: f64,
    stage_distribution: BTreeMap<u32, usize>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetched card whose next review date has arrived or is unset.
    pub fn record_due(&mut self) {
        self.due_count += 1;
    }

    /// A card left out because it is not due yet.
    pub fn record_not_due_skip(&mut self) {
        self.skipped_not_due += 1;
    }

    /// A card that was scheduled. `updated` is false if the write failed.
    pub fn record_outcome(&mut self, ease_before: f64, next: &NextState, updated: bool) {
        self.processed += 1;
        *self.stage_distribution.entry(next.stage).or_insert(0) += 1;
        if updated {
            self.updated += 1;
            self.ease_before_sum += ease_before;
            self.ease_after_sum += next.ease;
        } else {
            self.failed += 1;
        }
    }

    pub fn finalize(self) -> RunStats {
        let average = |sum: f64| {
            if self.updated == 0 {
                0.0
            } else {
                round2(sum / self.updated as f64)
            }
        };
        RunStats {
            processed: self.processed,
            updated: self.updated,
            failed: self.failed,
            due_count: self.due_count,
            skipped_not_due: self.skipped_not_due,
            avg_ease_before: average(self.ease_before_sum),
            avg_ease_after: average(self.ease_after_sum),
            stage_distribution: self.stage_distribution,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The finalized totals of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub due_count: usize,
    pub skipped_not_due: usize,
    pub avg_ease_before: f64,
    pub avg_ease_after: f64,
    /// Resulting stage to card count.
    pub stage_distribution: BTreeMap<u32, usize>,
}

impl RunStats {
    pub fn summary(&self, dry_run: bool) -> String {
        format!(
            "processed={} updated={} failed={} dry_run={}",
            self.processed, self.updated, self.failed, dry_run
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: Date,
    pub stats: RunStats,
}

/// Writes the stats file, its mirror, and the history file.
pub struct StatsWriter {
    stats_path: PathBuf,
    mirror_path: Option<PathBuf>,
    history_path: Option<PathBuf>,
    history_limit: usize,
}

impl StatsWriter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stats_path: config.stats_path.clone(),
            mirror_path: config.stats_mirror_path.clone(),
            history_path: config.history_path.clone(),
            history_limit: config.history_limit,
        }
    }

    /// Writing the stats file must succeed. The mirror and the history are
    /// best-effort.
    pub fn write(&self, today: Date, stats: &RunStats) -> Fallible<()> {
        let json = serde_json::to_string_pretty(stats)?;
        write_file(&self.stats_path, &json)?;
        log::info!("Wrote stats to {}.", self.stats_path.display());
        if let Some(mirror) = &self.mirror_path {
            if let Err(e) = write_file(mirror, &json) {
                log::warn!("Could not mirror stats to {}: {e}", mirror.display());
            }
        }
        if let Some(history) = &self.history_path {
            if let Err(e) = self.append_history(history, today, stats) {
                log::warn!("Could not update history {}: {e}", history.display());
            }
        }
        Ok(())
    }

    fn append_history(&self, path: &Path, today: Date, stats: &RunStats) -> Fallible<()> {
        let mut entries: Vec<HistoryEntry> = if path.exists() {
            match serde_json::from_str(&read_to_string(path)?) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Ignoring unreadable history {}: {e}", path.display());
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        entries.retain(|entry| entry.date != today);
        entries.push(HistoryEntry {
            date: today,
            stats: stats.clone(),
        });
        entries.sort_by_key(|entry| entry.date);
        if entries.len() > self.history_limit {
            entries.drain(..entries.len() - self.history_limit);
        }
        write_file(path, &serde_json::to_string_pretty(&entries)?)
    }
}

fn write_file(path: &Path, content: &str) -> Fallible<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
