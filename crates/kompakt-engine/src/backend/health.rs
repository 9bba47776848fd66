// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Circuit breaker for the remote compression service.
//
// When the service keeps failing at the transport level, the rest of the
// ladder should fail fast instead of waiting out a timeout per rung. After a
// cooldown one trial request is let through to see whether it recovered.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Too many failures, requests are blocked until the cooldown expires.
    Open,
    /// Cooldown expired, one trial request is in flight.
    HalfOpen,
}

/// Health of one backend endpoint.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_error: Option<String>,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_error: None,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a request should be sent now.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at) => {
                    let cooldown = cooldown_duration(self.consecutive_failures);
                    if opened_at.elapsed() >= cooldown {
                        info!("circuit half-open, allowing trial request");
                        self.state = CircuitState::HalfOpen;
                        true
                    } else {
                        debug!(
                            remaining_ms = (cooldown - opened_at.elapsed()).as_millis(),
                            "circuit open, blocking request"
                        );
                        false
                    }
                }
                None => {
                    self.state = CircuitState::Closed;
                    true
                }
            },
            // The trial request has not reported back yet.
            CircuitState::HalfOpen => false,
        }
    }

    /// The service answered (any HTTP status).
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(prev_state = ?self.state, "backend recovered, closing circuit");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.last_error = None;
    }

    /// The service could not be reached or timed out.
    pub fn record_failure(&mut self, error: &str) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());

        if self.consecutive_failures >= self.failure_threshold && self.state != CircuitState::Open {
            warn!(
                failures = self.consecutive_failures,
                "opening circuit breaker for compression backend"
            );
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
        } else if self.state == CircuitState::HalfOpen {
            warn!("trial request failed, reopening circuit breaker");
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3)
    }
}

/// 3 failures: 30 seconds, 5: two minutes, 10 or more: five minutes.
fn cooldown_duration(failures: u32) -> Duration {
    if failures >= 10 {
        Duration::from_secs(300)
    } else if failures >= 5 {
        Duration::from_secs(120)
    } else {
        Duration::from_secs(30)
    }
}
