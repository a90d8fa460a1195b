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

use clap::Parser;

use crate::cmd::review::ReviewArgs;
use crate::cmd::review::run_review;
use crate::cmd::rollback::run_rollback;
use crate::cmd::schedule::ScheduleArgs;
use crate::cmd::schedule::print_schedule;
use crate::error::Fallible;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Review a batch of cards and write back their new schedules.
    Review(ReviewArgs),
    /// Restore cards from a backup file.
    Rollback {
        /// Path to the backup file.
        backup: PathBuf,
        /// Path to the TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print what would be restored without writing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a card's next state as JSON, without touching the store.
    Schedule(ScheduleArgs),
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Review(args) => run_review(&args).await,
        Command::Rollback {
            backup,
            config,
            dry_run,
        } => run_rollback(&backup, config.as_deref(), dry_run).await,
        Command::Schedule(args) => print_schedule(&args),
    }
}
