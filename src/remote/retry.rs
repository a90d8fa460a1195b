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

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Anything carrying an HTTP status code.
pub trait HasStatus {
    fn status_code(&self) -> u16;
}

impl HasStatus for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

/// What a retried call came to.
#[derive(Debug, PartialEq)]
pub enum Outcome<R> {
    /// A 2xx response.
    Success(R),
    /// A non-retryable response, handed back untouched.
    Rejected(R),
    /// Every attempt failed in transport or with a transient status.
    NoResponse { attempts: u32 },
}

/// Bounded retries with exponential backoff: before attempt `n + 1`, sleep
/// `base_delay * 2^(n - 1)`.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// The sleep that follows a failed `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Runs `call` until it succeeds, is rejected, or the attempts run out.
    /// Transport errors, 429 and 5xx are retried.
    pub async fn execute<F, Fut, R, E>(&self, mut call: F) -> Outcome<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: HasStatus,
        E: Display,
    {
        for attempt in 1..=self.max_attempts {
            match call().await {
                Ok(response) => {
                    let status = response.status_code();
                    if (200..300).contains(&status) {
                        return Outcome::Success(response);
                    }
                    if !is_transient(status) {
                        return Outcome::Rejected(response);
                    }
                    log::debug!(
                        "Attempt {attempt}/{} got status {status}.",
                        self.max_attempts
                    );
                }
                Err(e) => {
                    log::debug!("Attempt {attempt}/{} failed: {e}", self.max_attempts);
                }
            }
            if attempt < self.max_attempts {
                sleep(self.backoff(attempt)).await;
            }
        }
        Outcome::NoResponse {
            attempts: self.max_attempts,
        }
    }
}

fn is_transient(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
