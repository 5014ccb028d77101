//! Prompts for page translation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the translation rules (heading
//!    depth, what to leave untranslated) means editing exactly one place.
//!
//! 2. **Testability**: unit tests inspect the rendered prompts directly,
//!    without a live provider.
//!
//! Callers can override the system prompt via
//! [`crate::config::TranslationConfig::system_prompt`]; `{language}` in an
//! override is replaced with the target language name.

use crate::language::language_name;
use crate::provider::TranslationContext;

/// Default system prompt. `{language}` is substituted at render time.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a professional translator of technical and academic documents. Translate one page of a PDF document into {language}.

Follow these rules precisely:

1. FIDELITY
   - Translate the whole page faithfully; never summarise, omit or add content
   - Keep numbers, formulas, code, URLs, e-mail addresses and proper nouns unchanged
   - Keep citation markers such as [12] or [3, 4] exactly as they appear

2. HEADINGS
   - Render section titles as Markdown headings
   - Choose the level from the section number depth: "1" → #, "2.1" → ##, "3.1.2" → ###
   - Un-numbered titles continue the hierarchy of the previous headings listed below

3. STRUCTURE
   - Rejoin lines that the PDF layout broke in the middle of a sentence
   - Use - for bulleted lists and 1. 2. 3. for numbered lists
   - Keep reference-list entries one per line, starting with their number

4. OUTPUT FORMAT
   - Output ONLY the translated Markdown
   - Do NOT wrap the output in a code block
   - Do NOT add commentary, notes or explanations"#;

/// Maximum number of previous headings carried into the prompt.
pub const MAX_CONTEXT_HEADINGS: usize = 40;

/// Render the system prompt for `target_language`.
pub fn system_prompt(template: Option<&str>, target_language: &str) -> String {
    template
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .replace("{language}", &language_name(target_language))
}

/// Render the user message: context first, then the page text.
pub fn user_prompt(text: &str, target_language: &str, context: &TranslationContext) -> String {
    let mut out = String::with_capacity(text.len() + 512);

    if !context.previous_headings.is_empty() {
        out.push_str("Headings translated so far (keep the same hierarchy):\n");
        let skip = context
            .previous_headings
            .len()
            .saturating_sub(MAX_CONTEXT_HEADINGS);
        for heading in &context.previous_headings[skip..] {
            out.push_str(heading);
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(recent) = context.recent_translation.as_deref() {
        if !recent.trim().is_empty() {
            out.push_str("End of the previous translated page (for continuity only, do not repeat it):\n\"\"\"\n");
            out.push_str(recent);
            out.push_str("\n\"\"\"\n\n");
        }
    }

    out.push_str(&format!(
        "Translate the following page into {}:\n\"\"\"\n{}\n\"\"\"",
        language_name(target_language),
        text
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_language() {
        let p = system_prompt(None, "ja");
        assert!(p.contains("into Japanese"));
        assert!(!p.contains("{language}"));
    }

    #[test]
    fn custom_template_is_substituted() {
        let p = system_prompt(Some("Translate to {language}. Be terse."), "de");
        assert_eq!(p, "Translate to German. Be terse.");
    }

    #[test]
    fn user_prompt_without_context_is_just_the_page() {
        let p = user_prompt("Hello", "fr", &TranslationContext::default());
        assert!(p.starts_with("Translate the following page into French"));
        assert!(p.contains("Hello"));
        assert!(!p.contains("Headings translated so far"));
    }

    #[test]
    fn user_prompt_includes_headings_and_recent_text() {
        let ctx = TranslationContext {
            recent_translation: Some("前のページの終わり".into()),
            previous_headings: vec!["# 1 はじめに".into(), "## 1.1 背景".into()],
        };
        let p = user_prompt("Body", "ja", &ctx);
        assert!(p.contains("## 1.1 背景"));
        assert!(p.contains("前のページの終わり"));
        assert!(p.find("## 1.1").unwrap() < p.find("Body").unwrap());
    }

    #[test]
    fn heading_context_is_capped() {
        let ctx = TranslationContext {
            recent_translation: None,
            previous_headings: (0..100).map(|i| format!("## H{i}")).collect(),
        };
        let p = user_prompt("x", "ja", &ctx);
        assert!(!p.contains("## H59\n"));
        assert!(p.contains("## H60\n"));
        assert!(p.contains("## H99\n"));
    }
}
