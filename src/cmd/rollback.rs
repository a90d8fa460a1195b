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

use std::path::Path;
use std::sync::Arc;

use crate::backup::BackupStore;
use crate::backup::RollbackReport;
use crate::backup::RollbackRunner;
use crate::config::Config;
use crate::config::Credentials;
use crate::error::Fallible;
use crate::remote::notion::NotionClient;
use crate::remote::notion::NotionStore;

/// Restores every card in a backup file.
pub async fn run_rollback(backup: &Path, config: Option<&Path>, dry_run: bool) -> Fallible<()> {
    let config = Config::load(config)?;
    let creds = Credentials::from_env(&config)?;
    let report = restore(&config, &creds, backup, dry_run).await?;
    println!(
        "restored={} failed={} dry_run={}",
        report.restored, report.failed, dry_run
    );
    Ok(())
}

async fn restore(
    config: &Config,
    creds: &Credentials,
    backup: &Path,
    dry_run: bool,
) -> Fallible<RollbackReport> {
    let entries = BackupStore::read(backup)?;
    log::info!("Restoring {} cards from {}.", entries.len(), backup.display());
    let client = Arc::new(NotionClient::from_config(config, creds.token.clone())?);
    let store = NotionStore::new(client, creds.review_db_id.clone(), config.page_size);
    Ok(RollbackRunner::new(&store, dry_run).run(&entries).await)
}
