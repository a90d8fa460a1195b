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

use crate::types::card::ReviewCard;
use crate::types::date::Date;

/// Decides whether a card is eligible for review today. A card that has
/// never been scheduled is always due.
pub fn is_due(next_review: Option<Date>, today: Date) -> bool {
    match next_review {
        None => true,
        Some(next_review) => next_review <= today,
    }
}

/// Why a card was left out of a run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exclusion {
    NotDue,
    MissingTags,
    StageBelowMin,
    StageAboveMax,
}

/// The user-selected card filters for a run.
#[derive(Clone, Debug, Default)]
pub struct CardFilter {
    pub only_due: bool,
    /// A card must carry all of these.
    pub required_tags: Vec<String>,
    /// Inclusive.
    pub stage_min: Option<u32>,
    /// Inclusive.
    pub stage_max: Option<u32>,
}

impl CardFilter {
    /// Returns the first filter the card fails, if any.
    pub fn check(&self, card: &ReviewCard, today: Date) -> Option<Exclusion> {
        if self.only_due && !is_due(card.next_review, today) {
            return Some(Exclusion::NotDue);
        }
        if !card.has_all_tags(&self.required_tags) {
            return Some(Exclusion::MissingTags);
        }
        if let Some(min) = self.stage_min {
            if card.stage < min {
                return Some(Exclusion::StageBelowMin);
            }
        }
        if let Some(max) = self.stage_max {
            if card.stage > max {
                return Some(Exclusion::StageAboveMax);
            }
        }
        None
    }
}

/// Splits a comma-separated tag list, dropping blanks.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(|tag| tag.to_string())
        .collect()
}
