// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Response payload checks for the remote compression service.

use std::fmt;

/// How far into the payload to look for markup.
const SNIFF_LEN: usize = 100;

/// Why a response body was not accepted as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadRejection {
    /// An HTML page, typically a proxy or login error page.
    HtmlErrorPage,
    /// Plain text, usually the service's own error message.
    TextualError(String),
    /// Binary data that is not a PDF, or a truncated PDF.
    NotADocument,
    Empty,
}

impl fmt::Display for PayloadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlErrorPage => write!(f, "HTML error page"),
            Self::TextualError(message) => write!(f, "service error: {message}"),
            Self::NotADocument => write!(f, "not a PDF document"),
            Self::Empty => write!(f, "empty response"),
        }
    }
}

/// Accept only bodies that start with `%PDF` and carry a `%%EOF` marker.
pub fn check_payload(body: &[u8]) -> Result<(), PayloadRejection> {
    if body.is_empty() {
        return Err(PayloadRejection::Empty);
    }
    if body.starts_with(b"%PDF") && has_eof_marker(body) {
        return Ok(());
    }
    Err(classify_rejection(body))
}

/// Searched across the whole body: incremental updates leave one marker per
/// revision and some services append trailing bytes after the last one.
fn has_eof_marker(body: &[u8]) -> bool {
    body.windows(5).any(|window| window == b"%%EOF")
}

fn classify_rejection(body: &[u8]) -> PayloadRejection {
    let head = &body[..body.len().min(SNIFF_LEN)];
    let lowered = String::from_utf8_lossy(head).to_ascii_lowercase();
    if lowered.contains("<html") || lowered.contains("<!doctype") {
        return PayloadRejection::HtmlErrorPage;
    }
    if body.starts_with(b"%PDF") {
        // Header present but no end marker: truncated transfer.
        return PayloadRejection::NotADocument;
    }
    match std::str::from_utf8(body) {
        Ok(text) => {
            let message: String = text.trim().chars().take(200).collect();
            PayloadRejection::TextualError(message)
        }
        Err(_) => PayloadRejection::NotADocument,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_complete_pdf() {
        assert!(check_payload(b"%PDF-1.5\n1 0 obj\n<<>>\nendobj\n%%EOF\n").is_ok());
    }

    #[test]
    fn html_error_page_is_rejected() {
        let body = b"<!DOCTYPE html><html><body>502 Bad Gateway</body></html>";
        assert_eq!(check_payload(body), Err(PayloadRejection::HtmlErrorPage));
    }

    #[test]
    fn textual_error_keeps_message() {
        let body = br#"{"error":"file too large"}"#;
        assert!(matches!(
            check_payload(body),
            Err(PayloadRejection::TextualError(message)) if message.contains("file too large")
        ));
    }

    #[test]
    fn truncated_and_binary_payloads_are_rejected() {
        assert_eq!(
            check_payload(b"%PDF-1.7\n1 0 obj\n<< /Length 9"),
            Err(PayloadRejection::NotADocument)
        );
        assert_eq!(
            check_payload(&[0x89, b'P', b'N', b'G', 0xFF, 0x00]),
            Err(PayloadRejection::NotADocument)
        );
        assert_eq!(check_payload(b""), Err(PayloadRejection::Empty));
    }
}
