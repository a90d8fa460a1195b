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

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use crate::backup::BackupStore;
use crate::cmd::resolve_today;
use crate::config::Config;
use crate::config::Credentials;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::filter::CardFilter;
use crate::filter::parse_tag_list;
use crate::quality::LinePrompter;
use crate::quality::Prompter;
use crate::quality::QualityResolver;
use crate::quality::QualityTable;
use crate::remote::CardStore;
use crate::remote::notion::NotionClient;
use crate::remote::notion::NotionStore;
use crate::remote::notion::NotionTasks;
use crate::remote::schema::SchemaMapping;
use crate::review::RunOptions;
use crate::review::RunReport;
use crate::review::processor::ReviewBatchProcessor;
use crate::schedule::Quality;
use crate::stats::StatsWriter;
use crate::types::date::Date;

#[derive(Args, Clone, Debug, Default)]
pub struct ReviewArgs {
    /// Path to the TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Rating for cards without one in the quality file.
    #[arg(long, default_value_t = 4)]
    pub quality: u8,
    /// Prompt for a rating for each card.
    #[arg(long)]
    pub interactive: bool,
    /// Only review cards that are due.
    #[arg(long)]
    pub only_due: bool,
    /// Review date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub today: Option<String>,
    /// Stop after this many cards. Zero means no limit.
    #[arg(long)]
    pub max: Option<usize>,
    /// Print decisions instead of writing them.
    #[arg(long)]
    pub dry_run: bool,
    /// Per-card ratings: JSON, or CSV with `title,quality,latency` columns.
    #[arg(long)]
    pub quality_file: Option<PathBuf>,
    /// Write run statistics.
    #[arg(long)]
    pub stats: bool,
    /// Only review cards carrying all of these comma-separated tags.
    #[arg(long)]
    pub tag: Option<String>,
    /// Minimum stage, inclusive.
    #[arg(long)]
    pub stage_min: Option<u32>,
    /// Maximum stage, inclusive.
    #[arg(long)]
    pub stage_max: Option<u32>,
    /// Record cards that end up mastered in the task database.
    #[arg(long)]
    pub tasks_sync: bool,
    /// Back up each card before updating it.
    #[arg(long)]
    pub backup: bool,
}

pub async fn run_review(args: &ReviewArgs) -> Fallible<()> {
    let config = Config::load(args.config.as_deref())?;
    let creds = Credentials::from_env(&config)?;
    let prompter: Option<Box<dyn Prompter>> = if args.interactive {
        Some(Box::new(LinePrompter::stdin()))
    } else {
        None
    };
    execute(&config, &creds, args, prompter).await
}

async fn execute(
    config: &Config,
    creds: &Credentials,
    args: &ReviewArgs,
    prompter: Option<Box<dyn Prompter>>,
) -> Fallible<()> {
    let today = resolve_today(args.today.as_deref())?;
    let quality = Quality::new(args.quality)?;
    let table = match &args.quality_file {
        Some(path) => QualityTable::load(path)?,
        None => QualityTable::default(),
    };
    let resolver = QualityResolver::new(table, quality, prompter);

    let client = Arc::new(NotionClient::from_config(config, creds.token.clone())?);
    let store = NotionStore::new(client.clone(), creds.review_db_id.clone(), config.page_size);
    let types = store
        .get_schema()
        .await
        .map_err(|e| ErrorReport::new(format!("could not read the card database schema: {e}")))?;
    let mapping = SchemaMapping::resolve(&types, &config.properties, &config.status_labels)?;
    log::debug!("Schema mapping: {mapping:?}");

    let tasks = match (&creds.tasks_db_id, args.tasks_sync) {
        (Some(id), true) => Some(NotionTasks::connect(client.clone(), id.clone()).await),
        (None, true) => {
            log::warn!("--tasks-sync is set but no tasks_db_id is configured.");
            None
        }
        (_, false) => None,
    };

    let options = RunOptions {
        today,
        filter: CardFilter {
            only_due: args.only_due,
            required_tags: args.tag.as_deref().map(parse_tag_list).unwrap_or_default(),
            stage_min: args.stage_min,
            stage_max: args.stage_max,
        },
        max_cards: args.max,
        dry_run: args.dry_run,
        backup: args.backup,
        tasks_sync: args.tasks_sync,
        max_pages: config.max_pages,
    };
    let report = ReviewBatchProcessor::new(&store, tasks.as_ref(), &mapping, resolver, options)
        .run()
        .await;
    finish(config, args, today, report)
}

/// Persists what the run produced, then reports a fetch failure if there
/// was one.
fn finish(config: &Config, args: &ReviewArgs, today: Date, report: RunReport) -> Fallible<()> {
    let backups = BackupStore::new(&config.backup_dir);
    if args.backup && !args.dry_run {
        if let Some(path) = backups.write(today, &report.backup)? {
            println!("Backup saved to {}.", path.display());
        }
    }
    if args.stats {
        StatsWriter::from_config(config).write(today, &report.stats)?;
    }
    for failure in &report.failures {
        log::info!("Not updated: {:?} ({}): {}", failure.title, failure.id, failure.reason);
    }
    if !report.mastery_tasks.is_empty() {
        log::info!("Mastery tasks: {}.", report.mastery_tasks.len());
    }
    println!("{}", report.stats.summary(args.dry_run));
    match backups.prune(today, config.backup_retain_days, config.backup_retain_max) {
        Ok(removed) if !removed.is_empty() => {
            log::info!("Pruned {} old backups.", removed.len());
        }
        Ok(_) => {}
        Err(e) => log::warn!("Could not prune backups: {e}"),
    }
    match report.fetch_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
