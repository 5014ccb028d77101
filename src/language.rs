//! Target-language codes: validation and display names.
//!
//! Codes are ISO 639-1 (`ja`, `en`) or ISO 639-3 (`jpn`, `eng`). The prompt
//! names the language in English ("Japanese") because models follow a name
//! more reliably than a bare code.

use crate::error::TranslateError;
use isolang::Language;

fn lookup(code: &str) -> Option<Language> {
    match code.len() {
        2 => Language::from_639_1(code),
        3 => Language::from_639_3(code),
        _ => None,
    }
}

/// Normalise and validate a language code, returning it lower-cased.
pub fn validate_language_code(code: &str) -> Result<String, TranslateError> {
    let normalized = code.trim().to_lowercase();
    if lookup(&normalized).is_some() {
        Ok(normalized)
    } else {
        Err(TranslateError::InvalidConfig(format!(
            "unknown target language code '{code}' (expected ISO 639-1 or 639-3, e.g. 'ja' or 'jpn')"
        )))
    }
}

/// English name of a language code, or the code itself when unknown.
pub fn language_name(code: &str) -> String {
    lookup(&code.trim().to_lowercase())
        .map(|lang| lang.to_name().to_string())
        .unwrap_or_else(|| code.to_string())
}
