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

//! An SM-2 style scheduler. Given a card's scheduling state and a recall
//! rating, computes the card's next state. Pure: no I/O, no clock.

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorReport;
use crate::error::fail;
use crate::types::card::CardStatus;
use crate::types::date::Date;

/// The easiness factor never drops below this.
pub const MIN_EASE: f64 = 1.3;

/// Ratings below this count as a failed recall.
const PASSING_QUALITY: u8 = 3;

/// The stage at which a card becomes eligible for mastery.
const MASTERY_STAGE: u32 = 8;

/// The minimum rating that can promote a card to mastered.
const MASTERY_QUALITY: u8 = 4;

/// Ease lost on a failed recall.
const FAILURE_PENALTY: f64 = 0.20;

/// Latency (in seconds) at which the slow-recall penalty saturates.
const LATENCY_CAP: f64 = 12.0;

/// The maximum slow-recall penalty.
const LATENCY_PENALTY: f64 = 0.08;

/// Perfect recalls faster than this (in seconds) earn a bonus.
const FAST_RECALL: f64 = 3.0;

const FAST_RECALL_BONUS: f64 = 0.02;

/// A self-rated recall quality, from 0 (no recall) to 5 (perfect).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, ErrorReport> {
        if value > Self::MAX {
            return fail(format!("quality must be between 0 and 5, got {value}"));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self) -> bool {
        self.0 >= PASSING_QUALITY
    }
}

impl TryFrom<u8> for Quality {
    type Error = ErrorReport;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Quality::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(value: Quality) -> Self {
        value.0
    }
}

impl FromStr for Quality {
    type Err = ErrorReport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(value) => Quality::new(value),
            Err(_) => fail(format!("invalid quality: {s:?}")),
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The scheduling fields of a card before a review.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SchedulingState {
    pub stage: u32,
    pub ease: f64,
    pub interval: u32,
}

/// The scheduling fields of a card after a review.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextState {
    pub stage: u32,
    /// Rounded to two decimal places.
    pub ease: f64,
    pub interval: u32,
    pub next_date: Date,
    pub status: CardStatus,
}

/// Computes a card's next scheduling state.
///
/// `latency` is the recall time in seconds. Negative values are treated as
/// unknown.
pub fn compute_next_state(
    current: SchedulingState,
    quality: Quality,
    today: Date,
    latency: Option<f64>,
) -> NextState {
    let q = quality.value();
    let latency = latency.filter(|l| *l >= 0.0);
    let mut stage = current.stage;
    let mut ease = current.ease;
    let interval: u32;
    let mut status: CardStatus;

    if !quality.is_passing() {
        stage = 0;
        interval = 1;
        ease -= FAILURE_PENALTY;
        status = CardStatus::Reset;
    } else {
        stage = stage.saturating_add(1);
        // The interval uses the ease from before this review.
        interval = match stage {
            1 => 1,
            2 => 6,
            _ => (f64::from(current.interval) * current.ease).round() as u32,
        };
        let miss = f64::from(Quality::MAX - q);
        ease += 0.1 - miss * (0.08 + miss * 0.02);
        status = CardStatus::Reviewing;
    }

    if let Some(latency) = latency {
        if quality.is_passing() {
            let factor = (latency / LATENCY_CAP).min(1.0);
            ease -= LATENCY_PENALTY * factor;
        }
        if q == Quality::MAX && latency < FAST_RECALL {
            ease += FAST_RECALL_BONUS;
        }
    }

    let ease = ease.max(MIN_EASE);
    let next_date = today.add_days(interval);

    if stage >= MASTERY_STAGE && q >= MASTERY_QUALITY {
        status = CardStatus::Mastered;
    }

    NextState {
        stage,
        ease: round_ease(ease),
        interval,
        next_date,
        status,
    }
}

/// Rounds to two decimal places, never below the minimum.
fn round_ease(ease: f64) -> f64 {
    ((ease * 100.0).round() / 100.0).max(MIN_EASE)
}
