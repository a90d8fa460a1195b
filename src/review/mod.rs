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

pub mod processor;

use crate::backup::BackupEntry;
use crate::error::ErrorReport;
use crate::filter::CardFilter;
use crate::remote::RemoteError;
use crate::stats::RunStats;
use crate::types::date::Date;

/// Settings for one review run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub today: Date,
    pub filter: CardFilter,
    /// Stop after this many cards have been processed. Zero means no limit.
    pub max_cards: Option<usize>,
    /// Preview decisions without writing anything.
    pub dry_run: bool,
    /// Snapshot each card before updating it.
    pub backup: bool,
    /// Record cards that end up mastered in the task tracker.
    pub tasks_sync: bool,
    /// Paging stops after this many pages.
    pub max_pages: u32,
}

/// A card whose update could not be written.
#[derive(Clone, Debug, PartialEq)]
pub struct CardFailure {
    pub id: String,
    pub title: String,
    pub reason: RemoteError,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub stats: RunStats,
    /// Pre-update snapshots, in processing order.
    pub backup: Vec<BackupEntry>,
    pub failures: Vec<CardFailure>,
    /// Cards a mastery task was created for, or would be in a dry run.
    pub mastery_tasks: Vec<String>,
    /// Set if fetching cards failed. Cards processed before the failure are
    /// still reflected in the rest of the report.
    pub fetch_error: Option<ErrorReport>,
}
