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

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio::time::sleep_until;

/// Bounds outbound calls to at most `max_calls` per rolling window, using a
/// sliding log of call timestamps. Local to one process: each instance
/// paces only the calls that go through it.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limiter admitting `max_per_second` calls per second.
    pub fn per_second(max_per_second: u32) -> Self {
        Self::new(max_per_second, Duration::from_secs(1))
    }

    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: (max_calls as usize).max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until the window admits another call, then records it.
    pub async fn acquire(&self) {
        // Holding the lock across the wait queues callers in arrival order.
        let mut calls = self.calls.lock().await;
        self.evict(&mut calls, Instant::now());
        if calls.len() >= self.max_calls {
            if let Some(&oldest) = calls.front() {
                let ready_at = oldest + self.window;
                log::debug!(
                    "Rate limit reached, waiting {}ms.",
                    ready_at.saturating_duration_since(Instant::now()).as_millis()
                );
                sleep_until(ready_at).await;
                self.evict(&mut calls, Instant::now());
            }
        }
        calls.push_back(Instant::now());
    }

    fn evict(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&first) = calls.front() {
            if now.duration_since(first) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}
