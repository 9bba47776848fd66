// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP client for the remote compression service.
//
// One call uploads the whole document as a multipart form and returns the
// raw response body. Payload checks and retries live in the caller.

use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use kompakt_core::config::BackendConfig;
use kompakt_core::error::{KompaktError, Result};
use kompakt_core::types::CompressionConfig;
use tracing::{debug, instrument};

/// Service optimisation level (1 = lightest, 9 = heaviest) for a ladder
/// quality: `1 + (95 − q) / 10`, clamped to 1..=9.
pub fn optimize_level(quality: u8) -> u8 {
    let level = 1 + (95 - i32::from(quality)) / 10;
    level.clamp(1, 9) as u8
}

/// Size hint sent with each request: between 50% (q55 and below) and 75%
/// (q95 and above) of the input, in whole kilobytes.
pub fn expected_output_size(original_size: usize, quality: u8) -> String {
    let fraction = (0.50 + 0.25 * (f64::from(quality) - 55.0) / 40.0).clamp(0.50, 0.75);
    let kilobytes = (original_size as f64 * fraction / 1024.0).ceil().max(1.0);
    format!("{}KB", kilobytes as u64)
}

/// Blocking client bound to one compress endpoint.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim().to_string();
        if endpoint.is_empty() {
            return Err(KompaktError::InvalidConfig("backend endpoint is empty".into()));
        }

        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout());
        if config.no_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(|err| {
            KompaktError::InvalidConfig(format!("failed to build backend client: {}", err))
        })?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the document. Any HTTP answer is returned as a [`BackendReply`];
    /// only transport failures are errors here.
    #[instrument(skip(self, buffer), fields(endpoint = %self.endpoint, bytes_len = buffer.len(), quality = config.quality()))]
    pub fn send(&self, buffer: &[u8], config: CompressionConfig) -> Result<BackendReply> {
        let part = Part::bytes(buffer.to_vec())
            .file_name("input.pdf")
            .mime_str("application/pdf")
            .map_err(|err| KompaktError::Backend(format!("invalid upload part: {}", err)))?;

        let form = Form::new()
            .part("fileInput", part)
            .text("optimizeLevel", optimize_level(config.quality()).to_string())
            .text("expectedOutputSize", expected_output_size(buffer.len(), config.quality()))
            .text("linearize", "false")
            .text("normalize", "false")
            .text("grayscale", "false");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        debug!(status, body_bytes = body.len(), "Backend answered");
        Ok(BackendReply { status, body })
    }
}

/// Raw answer of the service.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl BackendReply {
    /// The body of a 2xx answer. 5xx is `server-error` (transient), anything
    /// else non-2xx is `client-error` (permanent).
    pub fn into_body(self) -> Result<Vec<u8>> {
        match self.status {
            200..=299 => Ok(self.body),
            500..=599 => Err(KompaktError::Backend(format!("server-error {}", self.status))),
            status => {
                let detail = String::from_utf8_lossy(&self.body);
                let detail: String = detail.trim().chars().take(200).collect();
                Err(KompaktError::Backend(format!("client-error {}: {}", status, detail)))
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> KompaktError {
    if err.is_timeout() {
        KompaktError::Backend(format!("request timed out: {}", err))
    } else if err.is_connect() {
        KompaktError::Backend(format!("connect error: {}", err))
    } else {
        KompaktError::Backend(format!("transport error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimize_level_follows_quality() {
        assert_eq!(optimize_level(95), 1);
        assert_eq!(optimize_level(85), 2);
        assert_eq!(optimize_level(55), 5);
        assert_eq!(optimize_level(100), 1);
        assert_eq!(optimize_level(1), 9);
    }

    #[test]
    fn size_hint_is_clamped() {
        assert_eq!(expected_output_size(400 * 1024, 55), "200KB");
        assert_eq!(expected_output_size(400 * 1024, 95), "300KB");
        assert_eq!(expected_output_size(400 * 1024, 75), "250KB");
        assert_eq!(expected_output_size(400 * 1024, 20), "200KB");
        assert_eq!(expected_output_size(10, 55), "1KB");
    }

    #[test]
    fn reply_status_maps_to_error_class() {
        let ok = BackendReply { status: 200, body: b"%PDF".to_vec() };
        assert_eq!(ok.into_body().expect("body"), b"%PDF");

        let busy = BackendReply { status: 503, body: Vec::new() };
        let err = busy.into_body().err().expect("must fail");
        assert!(err.to_string().contains("server-error 503"));

        let too_large = BackendReply { status: 413, body: b"payload too large".to_vec() };
        let err = too_large.into_body().err().expect("must fail");
        assert!(err.to_string().contains("client-error 413: payload too large"));
    }

    #[test]
    fn empty_endpoint_is_invalid_config() {
        let err = HttpBackend::new(&BackendConfig::default()).err().expect("must fail");
        assert!(matches!(err, KompaktError::InvalidConfig(_)));
    }
}
