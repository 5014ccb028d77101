//! Heading-level normalisation across pages.
//!
//! Each page is translated in isolation, so the model picks heading levels
//! page by page: page 7 may open with `###` although the document never had
//! a `##`, or jump from `#` straight to `####`. [`normalize`] repairs that
//! with one rule, threaded through the document by a [`HeadingState`]:
//!
//! * the first heading on a page may be at most one level deeper than the
//!   last heading of the previous page;
//! * later headings on the page are shifted by the same correction, so the
//!   page's own relative structure survives, and are again never more than
//!   one level deeper than the heading before them.
//!
//! Only the `#` run changes; heading text and every other line are returned
//! byte for byte. Lines inside fenced code blocks are never headings. The
//! function is pure and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Cross-page heading memory. `last_level == 0` means no heading yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingState {
    pub last_level: u8,
}

/// A heading found in a page: level and text without the `#` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingMarker {
    pub level: u8,
    pub text: String,
}

impl HeadingMarker {
    pub fn to_markdown(&self) -> String {
        format!("{} {}", "#".repeat(self.level as usize), self.text)
    }
}

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^( {0,3})(#{1,6})([ \t]+.*|[ \t]*)$").unwrap());

static RE_SECTION_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:\.\d{1,3})*)\.?(?:\s|$)").unwrap());

// ── Fence tracking ───────────────────────────────────────────────────────────

/// Tracks whether the current line is inside a fenced code block.
#[derive(Debug, Default)]
pub(crate) struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Feed one line; returns true when the line is a fence or fenced content.
    pub(crate) fn consume(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();
        let fence = if indent <= 3 {
            ['`', '~'].into_iter().find_map(|c| {
                let run = trimmed.chars().take_while(|&ch| ch == c).count();
                (run >= 3).then_some((c, run))
            })
        } else {
            None
        };

        match (self.open, fence) {
            (None, Some(f)) => {
                self.open = Some(f);
                true
            }
            (Some((c, n)), Some((fc, fnum)))
                if c == fc && fnum >= n && trimmed[fnum * c.len_utf8()..].trim().is_empty() =>
            {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

pub(crate) struct HeadingLine<'a> {
    pub(crate) indent: &'a str,
    pub(crate) level: u8,
    pub(crate) rest: &'a str,
}

pub(crate) fn parse_heading(line: &str) -> Option<HeadingLine<'_>> {
    let caps = RE_HEADING.captures(line)?;
    Some(HeadingLine {
        indent: caps.get(1).map_or("", |m| m.as_str()),
        level: caps[2].len() as u8,
        rest: caps.get(3).map_or("", |m| m.as_str()),
    })
}

/// Split into lines keeping each terminator, so rewrites are lossless.
pub(crate) fn split_keep_eol(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split_inclusive('\n').map(|chunk| {
        let body = chunk.strip_suffix('\n').unwrap_or(chunk);
        let body = body.strip_suffix('\r').unwrap_or(body);
        (body, &chunk[body.len()..])
    })
}

/// Rewrite every heading line outside code fences through `f(level, rest)`.
fn rewrite_headings(text: &str, mut f: impl FnMut(u8, &str) -> u8) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fences = FenceState::default();

    for (line, eol) in split_keep_eol(text) {
        if fences.consume(line) {
            out.push_str(line);
        } else if let Some(h) = parse_heading(line) {
            let level = f(h.level, h.rest).clamp(1, 6);
            out.push_str(h.indent);
            out.push_str(&"#".repeat(level as usize));
            out.push_str(h.rest);
        } else {
            out.push_str(line);
        }
        out.push_str(eol);
    }
    out
}

/// All headings outside code fences, in order.
pub fn extract_headings(text: &str) -> Vec<HeadingMarker> {
    let mut fences = FenceState::default();
    split_keep_eol(text)
        .filter(|(line, _)| !fences.consume(line))
        .filter_map(|(line, _)| parse_heading(line))
        .map(|h| HeadingMarker {
            level: h.level,
            text: h.rest.trim().trim_end_matches('#').trim_end().to_string(),
        })
        .collect()
}

// ── Normalisation ────────────────────────────────────────────────────────────

/// Clamp the heading levels of one page against the document so far.
///
/// Returns the rewritten page and the state to pass to the next page.
pub fn normalize(page_text: &str, state: &HeadingState) -> (String, HeadingState) {
    let mut prev = state.last_level as i32;
    let mut offset: Option<i32> = None;

    let out = rewrite_headings(page_text, |level, _| {
        let original = level as i32;
        let corrected = match offset {
            None => {
                let c = original.min(prev + 1).max(1);
                offset = Some(c - original);
                c
            }
            Some(o) => (original + o).max(1).min(prev + 1),
        };
        prev = corrected;
        corrected as u8
    });

    let next = if offset.is_some() {
        HeadingState {
            last_level: prev as u8,
        }
    } else {
        *state
    };
    (out, next)
}

/// Set each numbered heading's level from its section number depth:
/// `3 Methods` → `#`, `3.1 Data` → `##`, `3.1.2 Sampling` → `###`.
///
/// Un-numbered headings are left alone.
pub fn apply_section_numbering(text: &str) -> String {
    rewrite_headings(text, |level, rest| {
        match RE_SECTION_NUMBER.captures(rest.trim_start()) {
            Some(caps) => (caps[1].matches('.').count() + 1).min(6) as u8,
            None => level,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(text: &str) -> Vec<u8> {
        extract_headings(text).iter().map(|h| h.level).collect()
    }

    #[test]
    fn skipped_level_is_closed() {
        let (out, st) = normalize("# Title\n\n### Deep\ntext\n", &HeadingState::default());
        assert_eq!(out, "# Title\n\n## Deep\ntext\n");
        assert_eq!(st.last_level, 2);
    }

    #[test]
    fn shallower_heading_on_next_page_is_unchanged() {
        let state = HeadingState { last_level: 2 };
        let (out, st) = normalize("# Next chapter\nbody", &state);
        assert_eq!(out, "# Next chapter\nbody");
        assert_eq!(st.last_level, 1);
    }

    #[test]
    fn first_heading_capped_and_deltas_kept() {
        let state = HeadingState { last_level: 2 };
        let (out, st) = normalize("#### A\n##### B\n#### C\n", &state);
        assert_eq!(levels(&out), vec![3, 4, 3]);
        assert_eq!(st.last_level, 3);
    }

    #[test]
    fn document_start_opens_at_level_one() {
        let (out, _) = normalize("## Abstract\n### Part\n", &HeadingState::default());
        assert_eq!(levels(&out), vec![1, 2]);
    }

    #[test]
    fn page_without_headings_keeps_state() {
        let state = HeadingState { last_level: 3 };
        let (out, st) = normalize("plain text\nmore\n", &state);
        assert_eq!(out, "plain text\nmore\n");
        assert_eq!(st, state);
    }

    #[test]
    fn heading_text_and_other_lines_untouched() {
        let input = "intro #not a heading\n#hashtag\n  ### Indented  title ##\n";
        let (out, _) = normalize(input, &HeadingState { last_level: 1 });
        assert_eq!(out, "intro #not a heading\n#hashtag\n  ## Indented  title ##\n");
    }

    #[test]
    fn code_fences_are_ignored() {
        let input = "# A\n```bash\n### not a heading\n```\n### B\n";
        let (out, _) = normalize(input, &HeadingState::default());
        assert_eq!(out, "# A\n```bash\n### not a heading\n```\n## B\n");
    }

    #[test]
    fn tilde_fence_needs_matching_close() {
        let input = "~~~~\n```\n# inside\n~~~~\n# outside\n";
        assert_eq!(levels(input), vec![1]);
        assert_eq!(extract_headings(input)[0].text, "outside");
    }

    #[test]
    fn normalize_is_idempotent() {
        let pages = [
            "### One\n##### Two\n# Three\n###### Four\n",
            "para\n## x\n#### y\n",
            "",
        ];
        for st in [0u8, 1, 3, 6] {
            let state = HeadingState { last_level: st };
            for p in pages {
                let (once, s1) = normalize(p, &state);
                let (twice, s2) = normalize(&once, &state);
                assert_eq!(once, twice);
                assert_eq!(s1, s2);
            }
        }
    }

    #[test]
    fn never_deeper_than_previous_plus_one() {
        let (out, _) = normalize("###### a\n# b\n###### c\n", &HeadingState { last_level: 2 });
        let lv = levels(&out);
        assert_eq!(lv, vec![3, 1, 2]);
    }

    #[test]
    fn crlf_is_preserved() {
        let (out, _) = normalize("# A\r\n### B\r\n", &HeadingState::default());
        assert_eq!(out, "# A\r\n## B\r\n");
    }

    #[test]
    fn section_numbers_set_levels() {
        let input = "# 1 Introduction\n# 2.1 Background\n## 3.1.2 Sampling\n### Appendix\n# 4. Results\n";
        let out = apply_section_numbering(input);
        assert_eq!(
            out,
            "# 1 Introduction\n## 2.1 Background\n### 3.1.2 Sampling\n### Appendix\n# 4. Results\n"
        );
    }

    #[test]
    fn extract_strips_closing_hashes() {
        let hs = extract_headings("## Methods ##\ntext\n# Intro");
        assert_eq!(
            hs,
            vec![
                HeadingMarker { level: 2, text: "Methods".into() },
                HeadingMarker { level: 1, text: "Intro".into() },
            ]
        );
        assert_eq!(hs[0].to_markdown(), "## Methods");
    }
}
