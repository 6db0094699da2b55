//! Response validation and bounded corrective retries.
//!
//! [`validate`] is pure: it turns raw service text into a JSON object or a
//! [`ValidationError`]. [`extract_validated`] wraps the extraction client in
//! a loop of at most `1 + max_retries` calls, sending a corrective follow-up
//! after each malformed answer. A service failure ends the loop at once; only
//! malformed output is worth re-asking for.

use crate::error::FileError;
use crate::pipeline::encode::Payload;
use crate::pipeline::llm::{ExtractionClient, ExtractionRequest, ServiceHints};
use crate::prompts::correction_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// A response that parsed to a top-level JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParsedJson(Map<String, Value>);

impl ParsedJson {
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Why a response was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("response was empty")]
    Empty,

    #[error("invalid JSON: {0}")]
    Syntax(String),

    #[error("top-level value is {0}, expected an object")]
    NotAnObject(&'static str),
}

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("static regex")
});

fn strip_fence(input: &str) -> &str {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str()),
        None => input,
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

/// Parse raw service output into a JSON object.
pub fn validate(raw: &str) -> Result<ParsedJson, ValidationError> {
    let cleaned = remove_invisible_chars(raw);
    let body = strip_fence(cleaned.trim()).trim();
    if body.is_empty() {
        return Err(ValidationError::Empty);
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(ParsedJson(map)),
        Ok(other) => Err(ValidationError::NotAnObject(type_name(&other))),
        Err(e) => Err(ValidationError::Syntax(e.to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How many corrective follow-ups to allow after the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AttemptOutcome {
    Valid,
    Invalid { message: String },
}

/// One call to the extraction service.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    /// 1-based.
    pub ordinal: u32,
    /// Instruction sent with this attempt: the prompt, or the correction.
    #[serde(skip_serializing)]
    pub prompt: String,
    #[serde(skip_serializing)]
    pub raw: String,
    pub raw_chars: usize,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// The validated object (or terminal error) plus every attempt made.
#[derive(Debug)]
pub struct ValidatedExtraction {
    pub outcome: Result<ParsedJson, FileError>,
    pub attempts: Vec<ExtractionAttempt>,
}

/// Call `client` until it returns a JSON object or the policy is exhausted.
pub async fn extract_validated(
    client: &dyn ExtractionClient,
    payload: &Payload,
    prompt: &str,
    hints: ServiceHints,
    policy: RetryPolicy,
) -> ValidatedExtraction {
    let max_attempts = policy.max_retries + 1;
    let mut attempts: Vec<ExtractionAttempt> = Vec::new();
    let mut correction: Option<String> = None;

    for ordinal in 1..=max_attempts {
        let request = ExtractionRequest {
            payload,
            prompt,
            correction: correction.as_deref(),
            hints,
        };

        let raw = match client.extract(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Extraction attempt {} failed: {}", ordinal, e);
                return ValidatedExtraction {
                    outcome: Err(FileError::Service {
                        detail: e.to_string(),
                    }),
                    attempts,
                };
            }
        };

        let sent = correction.take().unwrap_or_else(|| prompt.to_string());
        match validate(&raw) {
            Ok(json) => {
                debug!("Attempt {} produced a valid object", ordinal);
                attempts.push(ExtractionAttempt {
                    ordinal,
                    prompt: sent,
                    raw_chars: raw.chars().count(),
                    raw,
                    outcome: AttemptOutcome::Valid,
                });
                return ValidatedExtraction {
                    outcome: Ok(json),
                    attempts,
                };
            }
            Err(e) => {
                let message = e.to_string();
                if ordinal < max_attempts {
                    warn!(
                        "Attempt {}/{} returned malformed output ({}); retrying",
                        ordinal, max_attempts, message
                    );
                    correction = Some(correction_prompt(&message, &raw));
                }
                attempts.push(ExtractionAttempt {
                    ordinal,
                    prompt: sent,
                    raw_chars: raw.chars().count(),
                    raw,
                    outcome: AttemptOutcome::Invalid { message },
                });
            }
        }
    }

    let (last_error, last_raw) = match attempts.last() {
        Some(ExtractionAttempt {
            outcome: AttemptOutcome::Invalid { message },
            raw,
            ..
        }) => (message.clone(), raw.clone()),
        _ => (String::from("no attempts made"), String::new()),
    };
    ValidatedExtraction {
        outcome: Err(FileError::InvalidJsonOutput {
            attempts: attempts.len() as u32,
            last_error,
            last_raw,
        }),
        attempts,
    }
}
