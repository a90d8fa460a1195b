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

use clap::Args;

use crate::cmd::resolve_today;
use crate::error::Fallible;
use crate::error::fail;
use crate::schedule::MIN_EASE;
use crate::schedule::NextState;
use crate::schedule::Quality;
use crate::schedule::SchedulingState;
use crate::schedule::compute_next_state;

#[derive(Args, Clone, Debug)]
pub struct ScheduleArgs {
    /// Current stage.
    #[arg(long)]
    pub stage: u32,
    /// Current easiness factor.
    #[arg(long)]
    pub ease: f64,
    /// Current interval in days.
    #[arg(long)]
    pub interval: u32,
    /// Recall quality, 0 to 5.
    #[arg(long)]
    pub quality: u8,
    /// Recall time in seconds.
    #[arg(long)]
    pub latency: Option<f64>,
    /// Review date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub today: Option<String>,
}

/// Prints the next state of a card without touching the store.
pub fn print_schedule(args: &ScheduleArgs) -> Fallible<()> {
    let next = preview(args)?;
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

fn preview(args: &ScheduleArgs) -> Fallible<NextState> {
    if !args.ease.is_finite() {
        return fail(format!("invalid ease: {}", args.ease));
    }
    let quality = Quality::new(args.quality)?;
    let today = resolve_today(args.today.as_deref())?;
    let current = SchedulingState {
        stage: args.stage,
        ease: args.ease.max(MIN_EASE),
        interval: args.interval,
    };
    Ok(compute_next_state(current, quality, today, args.latency))
}
