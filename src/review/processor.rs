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

use serde_json::Value;
use serde_json::json;

use crate::backup::BackupEntry;
use crate::error::ErrorReport;
use crate::filter::Exclusion;
use crate::filter::is_due;
use crate::quality::QualityResolver;
use crate::remote::CardStore;
use crate::remote::RemoteError;
use crate::remote::RemotePage;
use crate::remote::TaskTracker;
use crate::remote::schema::SchemaMapping;
use crate::review::CardFailure;
use crate::review::RunOptions;
use crate::review::RunReport;
use crate::schedule::SchedulingState;
use crate::schedule::compute_next_state;
use crate::stats::StatsAggregator;
use crate::types::card::CardStatus;
use crate::types::card::ReviewCard;

/// Accumulates the results of a run.
struct Tally {
    stats: StatsAggregator,
    backup: Vec<BackupEntry>,
    failures: Vec<CardFailure>,
    mastery_tasks: Vec<String>,
    processed: usize,
}

/// Fetches cards page by page and reviews them one at a time.
pub struct ReviewBatchProcessor<'a, S: CardStore, T: TaskTracker> {
    store: &'a S,
    tasks: Option<&'a T>,
    mapping: &'a SchemaMapping,
    resolver: QualityResolver,
    options: RunOptions,
}

impl<'a, S: CardStore, T: TaskTracker> ReviewBatchProcessor<'a, S, T> {
    pub fn new(
        store: &'a S,
        tasks: Option<&'a T>,
        mapping: &'a SchemaMapping,
        resolver: QualityResolver,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            tasks,
            mapping,
            resolver,
            options,
        }
    }

    pub async fn run(mut self) -> RunReport {
        let mut tally = Tally {
            stats: StatsAggregator::new(),
            backup: Vec::new(),
            failures: Vec::new(),
            mastery_tasks: Vec::new(),
            processed: 0,
        };
        let fetch_error = self.process_pages(&mut tally).await;
        RunReport {
            stats: tally.stats.finalize(),
            backup: tally.backup,
            failures: tally.failures,
            mastery_tasks: tally.mastery_tasks,
            fetch_error,
        }
    }

    /// Pages through the store, processing each page before fetching the
    /// next. Returns the fetch error that ended the run, if any.
    async fn process_pages(&mut self, tally: &mut Tally) -> Option<ErrorReport> {
        let filter = if self.options.filter.only_due {
            Some(self.mapping.due_filter(self.options.today))
        } else {
            None
        };
        let mut cursor: Option<String> = None;
        let mut pages: u32 = 0;
        loop {
            if self.cap_reached(tally) {
                log::info!("Reached the limit of {} cards.", tally.processed);
                return None;
            }
            if pages >= self.options.max_pages {
                log::warn!("Stopping after {pages} pages.");
                return None;
            }
            let page = match self.store.query(filter.as_ref(), cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    log::error!("Fetching cards failed: {e}");
                    return Some(ErrorReport::new(format!("could not fetch cards: {e}")));
                }
            };
            pages += 1;
            log::debug!("Fetched page {pages} with {} cards.", page.results.len());
            for record in &page.results {
                if self.cap_reached(tally) {
                    break;
                }
                self.process_card(record, tally).await;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return None,
            }
        }
    }

    fn cap_reached(&self, tally: &Tally) -> bool {
        self.options
            .max_cards
            .is_some_and(|max| max > 0 && tally.processed >= max)
    }

    async fn process_card(&mut self, record: &RemotePage, tally: &mut Tally) {
        let today = self.options.today;
        let card = self.mapping.decode(record);
        if is_due(card.next_review, today) {
            tally.stats.record_due();
        }
        match self.options.filter.check(&card, today) {
            Some(Exclusion::NotDue) => {
                log::debug!("Skipping {:?}: not due.", card.title);
                tally.stats.record_not_due_skip();
                return;
            }
            Some(reason) => {
                log::debug!("Skipping {:?}: {reason:?}.", card.title);
                return;
            }
            None => {}
        }

        let input = self.resolver.resolve(&card);
        let current = SchedulingState {
            stage: card.stage,
            ease: card.ease,
            interval: card.interval,
        };
        let next = compute_next_state(current, input.quality, today, input.latency);
        let update = self.mapping.encode_update(&next, today);
        tally.processed += 1;

        let updated = if self.options.dry_run {
            let preview = json!({
                "id": card.id,
                "title": card.title,
                "quality": input.quality,
                "next": next,
                "properties": Value::Object(update),
            });
            println!("{preview}");
            true
        } else {
            if self.options.backup {
                tally.backup.push(BackupEntry {
                    id: card.id.clone(),
                    properties: self.mapping.snapshot(record),
                });
            }
            match self.store.patch(&card.id, &update).await {
                Ok(()) => {
                    log::debug!(
                        "Updated {:?}: stage {} -> {}, next review {}.",
                        card.title,
                        card.stage,
                        next.stage,
                        next.next_date
                    );
                    true
                }
                Err(e) => {
                    match &e {
                        RemoteError::NoResponse { .. } => {
                            log::warn!("No response updating {:?}: {e}", card.title)
                        }
                        RemoteError::Rejected { .. } | RemoteError::Malformed(_) => {
                            log::warn!("Update of {:?} failed: {e}", card.title)
                        }
                    }
                    tally.failures.push(CardFailure {
                        id: card.id.clone(),
                        title: card.title.clone(),
                        reason: e,
                    });
                    false
                }
            }
        };
        tally.stats.record_outcome(card.ease, &next, updated);

        if updated && next.status == CardStatus::Mastered && self.options.tasks_sync {
            if self.sync_task(&card).await {
                tally.mastery_tasks.push(card.id.clone());
            }
        }
    }

    /// Records a mastered card in the task tracker. Failures are logged.
    /// Returns whether a task was created or previewed.
    async fn sync_task(&self, card: &ReviewCard) -> bool {
        let Some(tasks) = self.tasks else {
            return false;
        };
        if self.options.dry_run {
            println!(
                "{}",
                json!({ "task": format!("Review mastered: {}", card.title), "card": card.id })
            );
            return true;
        }
        match tasks.create_mastery_task(&card.id, &card.title).await {
            Ok(()) => {
                log::info!("Created mastery task for {:?}.", card.title);
                true
            }
            Err(e) => {
                log::warn!("Could not create mastery task for {:?}: {e}", card.title);
                false
            }
        }
    }
}
