//! Scrubbing of credentials from error messages before they are logged or
//! returned to the model.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, ToolError};

pub const REDACTED: &str = "[REDACTED]";

/// Secrets shorter than this are not scrubbed by value; they would match
/// ordinary words.
const MIN_SECRET_LEN: usize = 4;

fn credential_param_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(key|api_key|apikey|token|access_token|subscription-key|x-subscription-token)=([^&\s]+)",
            )
            .ok()
        })
        .as_ref()
}

fn bearer_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").ok())
        .as_ref()
}

#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| s.len() >= MIN_SECRET_LEN)
            .collect();
        // Longest first so a secret containing another is replaced whole
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        secrets.dedup();
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        if let Some(re) = credential_param_pattern() {
            out = re
                .replace_all(&out, format!("${{1}}={}", REDACTED).as_str())
                .into_owned();
        }
        if let Some(re) = bearer_pattern() {
            out = re
                .replace_all(&out, format!("Bearer {}", REDACTED).as_str())
                .into_owned();
        }
        out
    }

    /// Fails with [`ToolError::RedactionViolation`] if any known secret
    /// appears verbatim in `text`.
    pub fn verify(&self, text: &str) -> Result<()> {
        if self.secrets.iter().any(|s| text.contains(s.as_str())) {
            return Err(ToolError::RedactionViolation);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}
