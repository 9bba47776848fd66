// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote compression backend.
//
// Candidates are produced by an HTTP compression service instead of the
// local rasterizer. Transport failures are retried with backoff and tracked
// by a circuit breaker; every answer is checked to be a real document with
// the right page count before it is handed to the scorer.

pub mod client;
pub mod health;
pub mod retry;
pub mod validate;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use kompakt_core::config::BackendConfig;
use kompakt_core::error::{KompaktError, Result};
use kompakt_core::types::CompressionConfig;
use kompakt_document::PdfSource;
use tracing::{info, instrument, warn};

use crate::executor::{CandidateExecutor, reparse};
use client::HttpBackend;
use health::CircuitBreaker;
use retry::{RetryConfig, RetryDecision, should_retry};
use validate::check_payload;

/// [`CandidateExecutor`] backed by the remote service.
pub struct RemoteExecutor {
    backend: HttpBackend,
    retry: RetryConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl RemoteExecutor {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let backend = HttpBackend::new(config)?;
        info!(endpoint = backend.endpoint(), "Remote compression backend configured");
        Ok(Self {
            backend,
            retry: RetryConfig::from(config),
            breaker: Mutex::new(CircuitBreaker::new(config.failure_threshold)),
        })
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send with retries until a 2xx body arrives or the error is final.
    fn fetch(&self, buffer: &[u8], config: CompressionConfig) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            {
                let mut breaker = self.breaker();
                if !breaker.allow_request() {
                    let last = breaker.last_error().unwrap_or("unknown").to_string();
                    return Err(KompaktError::Backend(format!(
                        "circuit open, last failure: {}",
                        last
                    )));
                }
            }

            let result = match self.backend.send(buffer, config) {
                Ok(reply) => {
                    self.breaker().record_success();
                    reply.into_body()
                }
                Err(err) => {
                    self.breaker().record_failure(&err.to_string());
                    Err(err)
                }
            };

            match result {
                Ok(body) => return Ok(body),
                Err(err) => match should_retry(&err, attempt, &self.retry) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(error = %err, attempt, "backend call failed, retrying");
                        attempt += 1;
                        thread::sleep(delay);
                    }
                    RetryDecision::GiveUp | RetryDecision::Exhausted => return Err(err),
                },
            }
        }
    }
}

impl CandidateExecutor for RemoteExecutor {
    fn name(&self) -> &'static str {
        "remote"
    }

    /// The service is only told a quality.
    fn uses_scale(&self) -> bool {
        false
    }

    #[instrument(skip(self, buffer), fields(scale = config.scale(), quality = config.quality()))]
    fn run(&self, buffer: &[u8], config: CompressionConfig) -> Result<Vec<u8>> {
        let expected_pages = reparse(buffer)?.page_count();

        let body = self.fetch(buffer, config)?;
        if let Err(rejection) = check_payload(&body) {
            return Err(KompaktError::Backend(format!("rejected payload: {}", rejection)));
        }
        PdfSource::validate(&body, expected_pages)?;

        info!(output_bytes = body.len(), "Remote candidate received");
        Ok(body)
    }
}
