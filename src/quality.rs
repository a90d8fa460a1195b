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

//! Where review ratings come from: a lookup file, an interactive prompt, or
//! the run-wide default.

use std::collections::HashMap;
use std::fs::read_to_string;
use std::io::BufRead;
use std::io::StdinLock;
use std::io::Stdout;
use std::io::Write;
use std::path::Path;

use csv::Reader;
use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;
use crate::schedule::Quality;
use crate::types::card::ReviewCard;

/// The rating for one review.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ReviewQualityInput {
    pub quality: Quality,
    /// Recall time in seconds, if known.
    pub latency: Option<f64>,
}

impl ReviewQualityInput {
    fn new(quality: u8, latency: Option<f64>) -> Fallible<Self> {
        Ok(Self {
            quality: Quality::new(quality)?,
            latency: latency.filter(|l| l.is_finite() && *l >= 0.0),
        })
    }
}

#[derive(Deserialize)]
struct JsonEntry {
    quality: u8,
    #[serde(default)]
    latency: Option<f64>,
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(alias = "卡片标题")]
    title: String,
    quality: u8,
    #[serde(default)]
    latency: Option<f64>,
}

/// Per-card ratings keyed by card title.
#[derive(Debug, Default)]
pub struct QualityTable {
    entries: HashMap<String, ReviewQualityInput>,
}

impl QualityTable {
    /// Loads a `.json` file, or reads anything else as CSV.
    pub fn load(path: &Path) -> Fallible<Self> {
        if !path.exists() {
            return fail(format!("quality file not found: {}", path.display()));
        }
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let table = if is_json {
            Self::from_json(&read_to_string(path)?)?
        } else {
            Self::from_csv(Reader::from_path(path)?)?
        };
        log::debug!(
            "Loaded {} quality entries from {}.",
            table.count(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_json(content: &str) -> Fallible<Self> {
        let raw: HashMap<String, JsonEntry> = serde_json::from_str(content)?;
        let mut entries = HashMap::new();
        for (title, entry) in raw {
            let input = ReviewQualityInput::new(entry.quality, entry.latency)?;
            entries.insert(title.trim().to_string(), input);
        }
        Ok(Self { entries })
    }

    pub fn from_csv<R: std::io::Read>(mut reader: Reader<R>) -> Fallible<Self> {
        let mut entries = HashMap::new();
        for row in reader.deserialize() {
            let row: CsvRow = row?;
            let title = row.title.trim();
            if title.is_empty() {
                continue;
            }
            let input = ReviewQualityInput::new(row.quality, row.latency)?;
            entries.insert(title.to_string(), input);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, title: &str) -> Option<ReviewQualityInput> {
        self.entries.get(title.trim()).copied()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Asks the user for a rating.
pub trait Prompter {
    fn ask(&mut self, card: &ReviewCard, default: Quality) -> Fallible<Quality>;
}

/// Prompts on a line-oriented stream. End of input takes the default.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompter<StdinLock<'static>, Stdout> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, card: &ReviewCard, default: Quality) -> Fallible<Quality> {
        writeln!(self.output, "\n{}", card.title)?;
        loop {
            write!(self.output, "Quality (0-5) [default {default}]: ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(default);
            }
            let line = line.trim();
            if line.is_empty() {
                return Ok(default);
            }
            match line.parse::<Quality>() {
                Ok(quality) => return Ok(quality),
                Err(_) => writeln!(self.output, "Please enter a number between 0 and 5.")?,
            }
        }
    }
}

/// Picks the rating for each card: the lookup table first, then the prompt
/// (in interactive mode), then the default.
pub struct QualityResolver {
    table: QualityTable,
    default: Quality,
    prompter: Option<Box<dyn Prompter>>,
}

impl QualityResolver {
    pub fn new(table: QualityTable, default: Quality, prompter: Option<Box<dyn Prompter>>) -> Self {
        Self {
            table,
            default,
            prompter,
        }
    }

    pub fn resolve(&mut self, card: &ReviewCard) -> ReviewQualityInput {
        if let Some(input) = self.table.get(&card.title) {
            return input;
        }
        let quality = match self.prompter.as_mut() {
            Some(prompter) => match prompter.ask(card, self.default) {
                Ok(quality) => quality,
                Err(e) => {
                    log::warn!("Prompt failed, using the default rating: {e}");
                    self.default
                }
            },
            None => self.default,
        };
        ReviewQualityInput {
            quality,
            latency: None,
        }
    }
}
