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

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Serialize;

use crate::types::date::Date;

/// The easiness factor assigned to cards that have none.
pub const DEFAULT_EASE: f64 = 2.5;

/// The interval assumed for cards that have none.
pub const DEFAULT_INTERVAL: u32 = 1;

/// Where a card is in its review lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// Imported, never reviewed.
    New,
    /// Recalled successfully at least once since the last reset.
    Reviewing,
    /// The last review failed.
    Reset,
    /// Sustained high-quality recall at a high stage.
    Mastered,
}

impl Display for CardStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CardStatus::New => write!(f, "new"),
            CardStatus::Reviewing => write!(f, "reviewing"),
            CardStatus::Reset => write!(f, "reset"),
            CardStatus::Mastered => write!(f, "mastered"),
        }
    }
}

/// A transient, in-memory copy of a card held by the remote store.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewCard {
    /// Opaque, store-assigned identifier.
    pub id: String,
    /// Display string. Not used for identity.
    pub title: String,
    /// Consecutive successful reviews since the last reset.
    pub stage: u32,
    /// Easiness factor. Never below 1.3.
    pub ease: f64,
    /// The last scheduled gap, in days.
    pub interval: u32,
    pub last_review: Option<Date>,
    pub next_review: Option<Date>,
    pub status: CardStatus,
    pub tags: BTreeSet<String>,
}

impl ReviewCard {
    /// A card in its freshly-imported state.
    #[cfg(test)]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            stage: 0,
            ease: DEFAULT_EASE,
            interval: 0,
            last_review: None,
            next_review: None,
            status: CardStatus::New,
            tags: BTreeSet::new(),
        }
    }

    /// True if the card carries every one of the given tags.
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }
}
