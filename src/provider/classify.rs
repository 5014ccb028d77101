//! Error classification: map a provider's error text to retryable or fatal.
//!
//! The LLM client libraries surface errors as display strings whose shape
//! differs per backend (`RESOURCE_EXHAUSTED`, `insufficient_quota`,
//! `overloaded_error`, plain HTTP codes…). Rather than hard-coding one
//! decision tree, an [`ErrorClassifier`] is an ordered table of regex rules:
//! the first rule whose pattern matches decides, and a message nothing
//! matches falls back to the table's default (retryable, since a wasted
//! retry costs seconds while a wrongly-fatal page costs the document).
//!
//! Tables are built from provider presets layered over a generic table, and
//! callers can prepend their own rules with [`ErrorClassifier::with_rule`].

use crate::error::ProviderError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// The decision a rule makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    class: ErrorClass,
}

fn rule(pattern: &str, class: ErrorClass) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        class,
    }
}

// ── Rule tables ──────────────────────────────────────────────────────────────

/// Applies to every provider, after any provider preset.
static GENERIC_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use ErrorClass::*;
    vec![
        rule(
            r"(?i)\b(401|403)\b|unauthori[sz]ed|forbidden|invalid[ _-]?api[ _-]?key|permission[ _-]?denied|authentication",
            Fatal,
        ),
        rule(r"(?i)content[ _-]?(policy|filter)|\bsafety\b", Fatal),
        rule(
            r"(?i)\b(408|429|500|502|503|504|529)\b|rate[ _-]?limit|too many requests|overloaded|unavailable|timed? ?out|deadline|connection|temporar|try again",
            Retryable,
        ),
        rule(
            r"(?i)\b4\d\d\b|bad request|invalid[ _-]?request|not found|unsupported",
            Fatal,
        ),
    ]
});

static GEMINI_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use ErrorClass::*;
    vec![
        rule(r"(?i)resource[ _]?exhausted|deadline[ _]?exceeded", Retryable),
        rule(r"(?i)prohibited[ _]?content|\bblocked\b|recitation", Fatal),
    ]
});

static OPENAI_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use ErrorClass::*;
    // insufficient_quota arrives as a 429 and must win over the generic 429 rule.
    vec![
        rule(r"(?i)insufficient[ _]?quota|billing", Fatal),
        rule(r"(?i)context[ _]?length[ _]?exceeded", Fatal),
    ]
});

static ANTHROPIC_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use ErrorClass::*;
    vec![
        rule(r"(?i)overloaded[ _]?error|\b529\b", Retryable),
        rule(
            r"(?i)authentication[ _]?error|permission[ _]?error|invalid[ _]?request[ _]?error",
            Fatal,
        ),
    ]
});

static RE_RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry[-_ ]?(?:after|delay)\D{0,20}?(\d+(?:\.\d+)?)\s*(ms|s\b|sec|seconds)?")
        .unwrap()
});

// ── Classifier ───────────────────────────────────────────────────────────────

/// Ordered, first-match-wins classification table.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<Rule>,
    default: ErrorClass,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::generic()
    }
}

impl ErrorClassifier {
    /// The provider-neutral table.
    pub fn generic() -> Self {
        Self {
            rules: GENERIC_RULES.clone(),
            default: ErrorClass::Retryable,
        }
    }

    /// The preset for a named provider layered over the generic table.
    ///
    /// Unknown names get the generic table. `claude` is an alias of `anthropic`.
    pub fn for_provider(name: &str) -> Self {
        let preset: &[Rule] = match name.to_ascii_lowercase().as_str() {
            "gemini" | "google" => GEMINI_RULES.as_slice(),
            "openai" | "azure" => OPENAI_RULES.as_slice(),
            "anthropic" | "claude" => ANTHROPIC_RULES.as_slice(),
            _ => &[],
        };
        let mut rules = preset.to_vec();
        rules.extend(GENERIC_RULES.iter().cloned());
        Self {
            rules,
            default: ErrorClass::Retryable,
        }
    }

    /// Prepend a rule; it takes precedence over every existing rule.
    pub fn with_rule(mut self, pattern: &str, class: ErrorClass) -> Result<Self, regex::Error> {
        let pattern = Regex::new(pattern)?;
        self.rules.insert(0, Rule { pattern, class });
        Ok(self)
    }

    /// Change the class used when no rule matches.
    pub fn with_default(mut self, class: ErrorClass) -> Self {
        self.default = class;
        self
    }

    pub fn class_of(&self, message: &str) -> ErrorClass {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(message))
            .map(|r| r.class)
            .unwrap_or(self.default)
    }

    /// Classify a provider error message into a [`ProviderError`].
    pub fn classify(&self, message: &str) -> ProviderError {
        match self.class_of(message) {
            ErrorClass::Retryable => ProviderError::Retryable {
                reason: message.to_string(),
                retry_after: parse_retry_after(message),
            },
            ErrorClass::Fatal => ProviderError::fatal(message),
        }
    }
}

/// Extract a `retry-after` / `retry_delay` hint from an error message.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let caps = RE_RETRY_AFTER.captures(message)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
    let secs = match unit.as_deref() {
        Some("ms") => value / 1000.0,
        _ => value,
    };
    // Out-of-range hints are dropped; the retry policy falls back to backoff.
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_table_basics() {
        let c = ErrorClassifier::generic();
        assert_eq!(c.class_of("HTTP 429 Too Many Requests"), ErrorClass::Retryable);
        assert_eq!(c.class_of("503 Service Unavailable"), ErrorClass::Retryable);
        assert_eq!(c.class_of("request timed out after 500s"), ErrorClass::Retryable);
        assert_eq!(c.class_of("401 Unauthorized"), ErrorClass::Fatal);
        assert_eq!(c.class_of("Invalid API key provided"), ErrorClass::Fatal);
        assert_eq!(c.class_of("400 Bad Request: malformed body"), ErrorClass::Fatal);
    }

    #[test]
    fn unmatched_message_defaults_to_retryable() {
        let c = ErrorClassifier::generic();
        assert_eq!(c.class_of("something odd happened"), ErrorClass::Retryable);
        let strict = ErrorClassifier::generic().with_default(ErrorClass::Fatal);
        assert_eq!(strict.class_of("something odd happened"), ErrorClass::Fatal);
    }

    #[test]
    fn openai_insufficient_quota_beats_429() {
        let msg = "429: You exceeded your current quota (insufficient_quota)";
        assert_eq!(ErrorClassifier::generic().class_of(msg), ErrorClass::Retryable);
        assert_eq!(ErrorClassifier::for_provider("openai").class_of(msg), ErrorClass::Fatal);
    }

    #[test]
    fn gemini_resource_exhausted_is_retryable() {
        let c = ErrorClassifier::for_provider("gemini");
        assert_eq!(c.class_of("RESOURCE_EXHAUSTED: quota"), ErrorClass::Retryable);
        assert_eq!(c.class_of("DeadlineExceeded"), ErrorClass::Retryable);
        assert_eq!(c.class_of("response blocked: PROHIBITED_CONTENT"), ErrorClass::Fatal);
    }

    #[test]
    fn anthropic_presets_and_alias() {
        let c = ErrorClassifier::for_provider("claude");
        assert_eq!(c.class_of("overloaded_error"), ErrorClass::Retryable);
        assert_eq!(c.class_of("invalid_request_error: bad model"), ErrorClass::Fatal);
    }

    #[test]
    fn custom_rule_takes_precedence() {
        let c = ErrorClassifier::generic()
            .with_rule(r"(?i)503.*maintenance", ErrorClass::Fatal)
            .unwrap();
        assert_eq!(c.class_of("503 down for maintenance"), ErrorClass::Fatal);
        assert_eq!(c.class_of("503 Service Unavailable"), ErrorClass::Retryable);
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        assert!(ErrorClassifier::generic()
            .with_rule("(unclosed", ErrorClass::Fatal)
            .is_err());
    }

    #[test]
    fn retry_after_hints() {
        assert_eq!(
            parse_retry_after("429 rate limited, Retry-After: 30"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("RESOURCE_EXHAUSTED retry_delay { seconds: 27 }"),
            Some(Duration::from_secs(27))
        );
        assert_eq!(
            parse_retry_after("\"retryDelay\": \"1.5s\""),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            parse_retry_after("retry after 250ms"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(parse_retry_after("503 Service Unavailable"), None);
    }

    #[test]
    fn oversized_retry_after_is_ignored() {
        assert_eq!(
            parse_retry_after("retry after 99999999999999999999999 seconds"),
            None
        );
        let infinite = format!("retry after {} seconds", "9".repeat(400));
        assert_eq!(parse_retry_after(&infinite), None);

        let e = ErrorClassifier::for_provider("openai")
            .classify("429 Too Many Requests; retry after 99999999999999999999999 seconds");
        assert!(e.is_retryable());
        assert!(matches!(e, ProviderError::Retryable { retry_after: None, .. }));
    }

    #[test]
    fn classify_attaches_retry_after() {
        let e = ErrorClassifier::generic().classify("429 Too Many Requests; retry-after 12");
        assert_eq!(
            e,
            ProviderError::Retryable {
                reason: "429 Too Many Requests; retry-after 12".into(),
                retry_after: Some(Duration::from_secs(12)),
            }
        );
        assert!(!ErrorClassifier::generic().classify("403 Forbidden").is_retryable());
    }
}
