//! Prompts for structured JSON extraction.
//!
//! Every prompt lives here so the extraction client and the retrier stay free
//! of prompt text, and so tests can inspect prompts without a provider.
//! Callers override the extraction instructions through
//! [`crate::config::ExtractionConfig::prompt`]; the JSON contract is always
//! appended.

/// Default extraction instructions, used when no prompt override is set.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an expert document analyst. Extract the structured content of the attached document into a single JSON object.

Follow these rules precisely:

1. COVERAGE
   - Capture every meaningful piece of information: titles, parties, dates, amounts, identifiers, line items
   - Preserve the document's own grouping (sections, sheets, tables) as nested objects or arrays
   - Represent tables as arrays of objects keyed by the column headers

2. VALUES
   - Keep numbers as JSON numbers when they are unambiguous; keep currency and units alongside
   - Use ISO 8601 for dates when the date is unambiguous, otherwise keep the original text
   - Do NOT invent values; omit fields that are not present

3. KEYS
   - Use concise snake_case keys in English
   - Include a top-level "document_type" describing what the document is"#;

/// Output contract appended to every system prompt.
pub const JSON_CONTRACT: &str = r#"

OUTPUT FORMAT
   - Output ONLY one JSON object, starting with { and ending with }
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary before or after the JSON"#;

/// User-turn text that accompanies attachments on the first attempt.
pub const ATTACHMENT_INSTRUCTION: &str = "Extract the attached document as a JSON object.";

/// Longest slice of a previous bad response quoted back in a correction.
const MAX_QUOTED_CHARS: usize = 2000;

/// Full system prompt: instructions (override or default) plus the contract.
pub fn system_prompt(custom: Option<&str>) -> String {
    format!(
        "{}{}",
        custom.unwrap_or(DEFAULT_EXTRACTION_PROMPT),
        JSON_CONTRACT
    )
}

/// Corrective follow-up sent after a response failed validation.
pub fn correction_prompt(error: &str, previous: &str) -> String {
    let quoted: String = previous.chars().take(MAX_QUOTED_CHARS).collect();
    let ellipsis = if previous.chars().count() > MAX_QUOTED_CHARS {
        "\n[…truncated]"
    } else {
        ""
    };
    format!(
        "Your previous answer was not a valid JSON object ({error}).\n\
Previous answer:\n\"\"\"{quoted}{ellipsis}\"\"\"\n\n\
Return the extraction again as exactly one JSON object and nothing else."
    )
}

/// Wrap inline text content for the user turn.
pub fn inline_document(name: &str, content: &str) -> String {
    format!("Document `{name}`:\n\n\"\"\"\n{content}\n\"\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_is_always_appended() {
        let default = system_prompt(None);
        assert!(default.starts_with("You are an expert document analyst"));
        assert!(default.ends_with(JSON_CONTRACT));

        let custom = system_prompt(Some("List the invoice lines."));
        assert!(custom.starts_with("List the invoice lines."));
        assert!(custom.contains("Output ONLY one JSON object"));
    }

    #[test]
    fn correction_quotes_and_truncates() {
        let p = correction_prompt("expected value at line 1", "oops");
        assert!(p.contains("expected value at line 1"));
        assert!(p.contains("\"\"\"oops\"\"\""));

        let long = "x".repeat(MAX_QUOTED_CHARS + 10);
        let p = correction_prompt("e", &long);
        assert!(p.contains("[…truncated]"));
    }

    #[test]
    fn inline_document_names_the_file() {
        let s = inline_document("notes.txt", "hello");
        assert!(s.starts_with("Document `notes.txt`"));
        assert!(s.contains("hello"));
    }
}
