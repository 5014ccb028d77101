//! Citation linking: turn `[n]` markers into links to the bibliography.
//!
//! Runs once on the assembled document (a marker on page 3 usually points at
//! an entry on page 20). The reference block is the section under the *last*
//! heading named like a bibliography (`References`, `参考文献`, …); it ends at
//! the next heading of the same or a shallower level.
//!
//! Inside the block, every line starting with `[n]`, `n.` or `n)` is an
//! entry and receives an `<a id="ref-n"></a>` anchor after its number (the
//! first entry for a number wins). Outside the block and outside code fences,
//! `[n]` and `[n, m]` markers whose numbers have an entry become
//! `[[n](#ref-n)]` / `[[n](#ref-n), [m](#ref-m)]`; numbers without an entry
//! stay literal. Anchors already present are reused and linked markers are
//! recognised, so linking twice equals linking once.

use crate::pipeline::headings::{parse_heading, split_keep_eol, FenceState};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Headings that open a bibliography, compared after normalisation.
pub const DEFAULT_REFERENCE_LABELS: &[&str] = &[
    "references",
    "reference",
    "bibliography",
    "works cited",
    "literature cited",
    "参考文献",
    "引用文献",
    "文献",
    "参考資料",
    "références",
    "referencias",
    "literatur",
    "참고문헌",
];

static RE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s{0,3}(?:[-*+]\s+)?)(\[(\d+)\]|(\d+)[.)])(\s*)(.*)$").unwrap());

static RE_EXISTING_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^<a id="([^"]+)"></a>"#).unwrap());

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+(?:\s*[,，]\s*\d+)*)\]").unwrap());

static RE_LEADING_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*\.?\s*").unwrap());

/// Entry number → anchor id, for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationIndex {
    anchors: BTreeMap<u32, String>,
}

impl CitationIndex {
    pub fn anchor(&self, number: u32) -> Option<&str> {
        self.anchors.get(&number).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.anchors.keys().copied()
    }
}

/// Counts reported by [`CitationLinker::link_with_report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationReport {
    /// Bibliography entries indexed.
    pub entries: usize,
    /// Individual citation numbers turned into links.
    pub markers_linked: usize,
}

struct Line<'a> {
    body: &'a str,
    eol: &'a str,
    fenced: bool,
    heading: Option<(u8, String)>,
}

fn scan(text: &str) -> Vec<Line<'_>> {
    let mut fences = FenceState::default();
    split_keep_eol(text)
        .map(|(body, eol)| {
            let fenced = fences.consume(body);
            let heading = if fenced {
                None
            } else {
                parse_heading(body).map(|h| {
                    let t = h.rest.trim().trim_end_matches('#').trim_end().to_string();
                    (h.level, t)
                })
            };
            Line {
                body,
                eol,
                fenced,
                heading,
            }
        })
        .collect()
}

fn normalise_label(heading_text: &str) -> String {
    let t = RE_LEADING_SECTION.replace(heading_text.trim(), "");
    t.trim()
        .trim_end_matches([':', '：'])
        .trim()
        .to_lowercase()
}

/// Finds the bibliography, indexes it and links citation markers.
#[derive(Debug, Clone)]
pub struct CitationLinker {
    labels: Vec<String>,
}

impl Default for CitationLinker {
    fn default() -> Self {
        Self {
            labels: DEFAULT_REFERENCE_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CitationLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one more bibliography heading (compared case-insensitively).
    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.push(normalise_label(label));
        self
    }

    fn is_reference_heading(&self, text: &str) -> bool {
        let norm = normalise_label(text);
        self.labels.iter().any(|l| *l == norm)
    }

    /// Line range of the reference block (excluding its heading).
    fn find_block(&self, lines: &[Line<'_>]) -> Option<(usize, usize)> {
        let (h_idx, level) = lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| match &l.heading {
                Some((lv, t)) if self.is_reference_heading(t) => Some((i, *lv)),
                _ => None,
            })
            .last()?;

        let start = h_idx + 1;
        let end = lines[start..]
            .iter()
            .position(|l| matches!(l.heading, Some((lv, _)) if lv <= level))
            .map(|p| start + p)
            .unwrap_or(lines.len());
        Some((start, end))
    }

    /// Index the bibliography without rewriting anything.
    pub fn build_index(&self, text: &str) -> CitationIndex {
        let lines = scan(text);
        let mut index = CitationIndex::default();
        if let Some((start, end)) = self.find_block(&lines) {
            for line in lines[start..end].iter().filter(|l| !l.fenced) {
                index_entry(line.body, &mut index);
            }
        }
        index
    }

    /// Link citation markers to their bibliography entries.
    pub fn link(&self, text: &str) -> String {
        self.link_with_report(text).0
    }

    pub fn link_with_report(&self, text: &str) -> (String, CitationReport) {
        let lines = scan(text);
        let Some((start, end)) = self.find_block(&lines) else {
            return (text.to_string(), CitationReport::default());
        };

        // Anchor entries first so markers before the block can be resolved.
        let mut index = CitationIndex::default();
        let mut bodies: Vec<String> = lines.iter().map(|l| l.body.to_string()).collect();
        for i in start..end {
            if !lines[i].fenced {
                if let Some(rewritten) = index_entry(lines[i].body, &mut index) {
                    bodies[i] = rewritten;
                }
            }
        }

        let mut report = CitationReport {
            entries: index.len(),
            markers_linked: 0,
        };
        if !index.is_empty() {
            for (i, line) in lines.iter().enumerate() {
                if (start..end).contains(&i) || line.fenced {
                    continue;
                }
                bodies[i] = link_markers(line.body, &index, &mut report.markers_linked);
            }
        }

        let mut out = String::with_capacity(text.len() + report.markers_linked * 16);
        for (body, line) in bodies.iter().zip(&lines) {
            out.push_str(body);
            out.push_str(line.eol);
        }
        (out, report)
    }
}

/// Link with the default label set.
pub fn link(text: &str) -> String {
    CitationLinker::default().link(text)
}

/// Record a bibliography line in `index`.
///
/// Returns the line with an anchor inserted when the entry is new and had
/// none; `None` when the line is not an entry, is a duplicate, or already
/// carries an anchor.
fn index_entry(line: &str, index: &mut CitationIndex) -> Option<String> {
    let caps = RE_ENTRY.captures(line)?;
    let number: u32 = caps
        .get(3)
        .or_else(|| caps.get(4))
        .and_then(|m| m.as_str().parse().ok())?;
    if index.anchors.contains_key(&number) {
        return None;
    }

    let rest = caps.get(6).map_or("", |m| m.as_str());
    if let Some(existing) = RE_EXISTING_ANCHOR.captures(rest) {
        index.anchors.insert(number, existing[1].to_string());
        return None;
    }

    let anchor = format!("ref-{number}");
    let rewritten = format!(
        "{}{} <a id=\"{}\"></a>{}",
        &caps[1], &caps[2], anchor, rest
    );
    index.anchors.insert(number, anchor);
    Some(rewritten)
}

fn starts_with_marker(text: &str) -> bool {
    RE_MARKER.find(text).is_some_and(|m| m.start() == 0)
}

/// Rewrite the citation markers of one line.
fn link_markers(line: &str, index: &CitationIndex, linked: &mut usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    let mut previous_end = None;

    for caps in RE_MARKER.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue };
        let adjacent_to_previous = previous_end == Some(m.start());
        previous_end = Some(m.end());

        // `[n](...)` is link text; `[text][n]` and `[n][label]` are
        // reference-style links. Runs of markers like `[1][2]` are citations.
        let rest = &line[m.end()..];
        let before = line[..m.start()].chars().next_back();
        let label_follows = rest.starts_with('[') && !starts_with_marker(rest);
        if rest.starts_with('(')
            || label_follows
            || (before == Some(']') && !adjacent_to_previous)
        {
            continue;
        }

        let numbers: Vec<&str> = caps[1].split([',', '，']).map(str::trim).collect();
        let resolve = |n: &str| n.parse::<u32>().ok().and_then(|n| index.anchor(n));
        if !numbers.iter().any(|n| resolve(n).is_some()) {
            continue;
        }

        let rendered: Vec<String> = numbers
            .iter()
            .map(|n| match resolve(n) {
                Some(anchor) => {
                    *linked += 1;
                    format!("[{n}](#{anchor})")
                }
                None => n.to_string(),
            })
            .collect();

        out.push_str(&line[last..m.start()]);
        out.push('[');
        out.push_str(&rendered.join(", "));
        out.push(']');
        last = m.end();
    }

    out.push_str(&line[last..]);
    out
}
