//! Hierarchical section segmentation for numbered regulatory documents.
//!
//! Documents in scope number their sections with dotted numerals
//! (`1.`, `1.1.`, `3.2.1.`). The segmenter trims front matter and the
//! trailing reference block, recovers top-level section titles, and splits
//! the remaining text into ordered, non-empty subsection bodies.
//!
//! Segmentation never fails: malformed input degrades to fewer (or zero)
//! sections, never to an error.

use std::collections::HashMap;
use std::fmt;

use crate::normalizer::normalize;

/// Dotted hierarchical numeral, e.g. `3.2.1`.
///
/// Components are positive integers; the first component identifies the
/// top-level section the numeral belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNumber {
    components: Vec<u32>,
}

impl SectionNumber {
    fn new(components: Vec<u32>) -> Self {
        debug_assert!(!components.is_empty());
        Self { components }
    }

    /// The top-level (main) section number, i.e. the first component.
    pub fn main(&self) -> u32 {
        self.components[0]
    }
}

impl fmt::Display for SectionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, component) in self.components.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// One segmentation unit: a numbered subsection with its cleaned body text.
///
/// Identifiers and document association are assigned by the ingestion layer,
/// not here.
#[derive(Debug, Clone)]
pub struct Section {
    /// Dotted numeral of this section.
    pub number: SectionNumber,
    /// Title of the top-level section this belongs to, or the synthetic
    /// `Section N` placeholder when no title was discoverable.
    pub main_title: String,
    /// Citation label shown to end users: `"{main_title} {number}"`.
    pub label: String,
    /// Normalized body text; never empty.
    pub text: String,
}

/// Splits raw extracted text into an ordered sequence of sections.
///
/// The steps, in order: discard everything before the first top-level
/// heading, truncate from a trailing `Citations:` block, discover top-level
/// titles, split on dotted subsection numerals, then clean each body and
/// drop the empty ones. Output order is strictly source order.
///
/// Title recovery relies on a heading being immediately followed by its
/// first subsection (`N. Title N.1.`); documents that violate that
/// adjacency keep their sections but fall back to placeholder titles.
pub fn segment(raw: &str) -> Vec<Section> {
    let trimmed = trim_citation_block(trim_preamble(raw));
    let titles = discover_titles(trimmed);
    let splits = find_subsection_splits(trimmed);
    crate::debug_log!(
        "segmenter: {} titles discovered, {} split points",
        titles.len(),
        splits.len()
    );

    let mut sections = Vec::with_capacity(splits.len());
    for (idx, found) in splits.iter().enumerate() {
        let body_end = splits
            .get(idx + 1)
            .map(|next| next.start)
            .unwrap_or(trimmed.len());
        let body = &trimmed[found.body_start..body_end];
        let text = normalize(strip_trailing_heading(body));
        if text.is_empty() {
            continue;
        }
        let number = SectionNumber::new(found.components.clone());
        let main = number.main();
        let main_title = titles
            .get(&main)
            .cloned()
            .unwrap_or_else(|| format!("Section {main}"));
        let label = format!("{main_title} {number}");
        sections.push(Section {
            number,
            main_title,
            label,
            text,
        });
    }
    sections
}

/// Drops front matter (cover pages, tables of contents) before the first
/// top-level heading. Text without any such heading is kept whole.
fn trim_preamble(text: &str) -> &str {
    match find_first_top_heading(text.as_bytes()) {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Truncates from the end-of-document reference marker onward, inclusive.
fn trim_citation_block(text: &str) -> &str {
    match text.find("Citations:") {
        Some(start) => &text[..start],
        None => text,
    }
}

/// Position of the first heading shaped `N. Word` where `N` is a whole
/// integer token and `Word` starts with an uppercase letter.
fn find_first_top_heading(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        if at_integer_token(bytes, i) {
            match parse_integer(bytes, i) {
                Some((_, after)) if heading_follows(bytes, after) => return Some(i),
                Some((_, after)) => i = after,
                None => i = digit_run_end(bytes, i),
            }
        } else {
            i += 1;
        }
    }
    None
}

fn heading_follows(bytes: &[u8], pos: usize) -> bool {
    if bytes.get(pos) != Some(&b'.') {
        return false;
    }
    let word = skip_whitespace(bytes, pos + 1);
    word > pos + 1 && bytes.get(word).is_some_and(|b| b.is_ascii_uppercase())
}

/// Recovers top-level section titles in a single left-to-right scan.
///
/// A title is recognized from the adjacency `N. Title N.1.`, a top-level
/// heading immediately followed by the start of its first subsection. The
/// captured title is the single capitalized word after the number; the
/// first occurrence per number wins.
fn discover_titles(text: &str) -> HashMap<u32, String> {
    let bytes = text.as_bytes();
    let mut titles = HashMap::new();
    let mut i = 0;
    while i < bytes.len() {
        if at_integer_token(bytes, i) {
            if let Some((number, after)) = parse_integer(bytes, i) {
                if let Some(title) = parse_titled_heading(text, after, number) {
                    titles.entry(number).or_insert(title);
                }
                i = after;
                continue;
            }
        }
        i += 1;
    }
    titles
}

/// Matches `. <Word> {number}.1.` starting just after a top-level number
/// and returns the captured title word.
fn parse_titled_heading(text: &str, pos: usize, number: u32) -> Option<String> {
    let bytes = text.as_bytes();
    if *bytes.get(pos)? != b'.' {
        return None;
    }
    let word_start = skip_whitespace(bytes, pos + 1);
    if word_start == pos + 1 || !bytes.get(word_start)?.is_ascii_uppercase() {
        return None;
    }
    let mut word_end = word_start + 1;
    while word_end < bytes.len() && bytes[word_end].is_ascii_lowercase() {
        word_end += 1;
    }
    if word_end == word_start + 1 {
        return None;
    }
    let subsection = skip_whitespace(bytes, word_end);
    let (repeat, after_repeat) = parse_integer(bytes, subsection)?;
    if repeat != number {
        return None;
    }
    if bytes.get(after_repeat..after_repeat + 3) != Some(b".1.".as_slice()) {
        return None;
    }
    Some(text[word_start..word_end].to_string())
}

/// A dotted numeral split point: the numeral's components, its byte offset,
/// and where the following body text begins.
struct SubsectionSplit {
    components: Vec<u32>,
    start: usize,
    body_start: usize,
}

/// Finds every split point: a numeral of two or more dot-separated
/// components terminated by `.` and whitespace. Numerals that do not match
/// this grammar contribute no boundary; their text is absorbed into the
/// surrounding section.
fn find_subsection_splits(text: &str) -> Vec<SubsectionSplit> {
    let bytes = text.as_bytes();
    let mut splits = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()) {
            match parse_split_numeral(bytes, i) {
                Some(split) => {
                    i = split.body_start;
                    splits.push(split);
                }
                None => i = digit_run_end(bytes, i),
            }
        } else {
            i += 1;
        }
    }
    splits
}

fn parse_split_numeral(bytes: &[u8], start: usize) -> Option<SubsectionSplit> {
    let mut components = Vec::new();
    let mut pos = start;
    loop {
        let (component, after) = parse_integer(bytes, pos)?;
        components.push(component);
        if bytes.get(after) != Some(&b'.') {
            return None;
        }
        match bytes.get(after + 1) {
            Some(next) if next.is_ascii_digit() => pos = after + 1,
            Some(next) if next.is_ascii_whitespace() && components.len() >= 2 => {
                let body_start = skip_whitespace(bytes, after + 1);
                return Some(SubsectionSplit {
                    components,
                    start,
                    body_start,
                });
            }
            _ => return None,
        }
    }
}

/// Removes a heading fragment that leaked into the tail of a body chunk:
/// `digits. CapitalizedWord` with nothing but whitespace after it.
fn strip_trailing_heading(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut k = bytes.len();
    while k > 0 && bytes[k - 1].is_ascii_whitespace() {
        k -= 1;
    }
    let word_end = k;
    while k > 0 && bytes[k - 1].is_ascii_lowercase() {
        k -= 1;
    }
    if k == word_end || k == 0 || !bytes[k - 1].is_ascii_uppercase() {
        return text;
    }
    k -= 1;
    let ws_end = k;
    while k > 0 && bytes[k - 1].is_ascii_whitespace() {
        k -= 1;
    }
    if k == ws_end || k == 0 || bytes[k - 1] != b'.' {
        return text;
    }
    k -= 1;
    let digit_end = k;
    while k > 0 && bytes[k - 1].is_ascii_digit() {
        k -= 1;
    }
    if k == digit_end {
        return text;
    }
    &text[..k]
}

/// True when `i` starts an integer token (a digit not inside a digit run
/// or a dotted numeral tail).
fn at_integer_token(bytes: &[u8], i: usize) -> bool {
    bytes[i].is_ascii_digit() && (i == 0 || !matches!(bytes[i - 1], b'0'..=b'9' | b'.'))
}

/// Parses the digit run at `start` as a `u32`; absurdly long runs that
/// overflow are treated as non-matches.
fn parse_integer(bytes: &[u8], start: usize) -> Option<(u32, usize)> {
    let end = digit_run_end(bytes, start);
    if end == start {
        return None;
    }
    let run = std::str::from_utf8(&bytes[start..end]).ok()?;
    run.parse().ok().map(|value| (value, end))
}

fn digit_run_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

fn skip_whitespace(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}
