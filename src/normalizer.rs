//! Whitespace repair for text recovered by layout-mode PDF extraction.
//!
//! Layout extractors frequently glue adjacent tokens together when column
//! positions collapse ("Section3.Scopeapplies"). The passes here re-insert
//! the missing spaces at the boundaries where that corruption is detectable.

/// Repairs missing-whitespace artifacts and collapses whitespace runs.
///
/// Passes run in a fixed order so that later passes never re-corrupt the
/// output of earlier ones:
/// 1. lowercase letter followed by an uppercase letter,
/// 2. sentence punctuation followed by a letter,
/// 3. letter followed by a digit,
/// 4. digit followed by a letter,
/// 5. collapse whitespace runs to a single space and trim.
///
/// Pure and infallible; `normalize(normalize(x)) == normalize(x)` for all x.
pub fn normalize(raw: &str) -> String {
    let text = split_boundary(raw, |a, b| a.is_ascii_lowercase() && b.is_ascii_uppercase());
    let text = split_boundary(&text, |a, b| is_sentence_punct(a) && b.is_ascii_alphabetic());
    let text = split_boundary(&text, |a, b| a.is_ascii_alphabetic() && b.is_ascii_digit());
    let text = split_boundary(&text, |a, b| a.is_ascii_digit() && b.is_ascii_alphabetic());
    collapse_whitespace(&text)
}

fn is_sentence_punct(ch: char) -> bool {
    matches!(ch, '.' | ',' | ';' | ':' | '!' | '?')
}

/// Inserts a single space between every adjacent pair matching `boundary`.
fn split_boundary(input: &str, boundary: fn(char, char) -> bool) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut prev: Option<char> = None;
    for ch in input.chars() {
        if let Some(last) = prev {
            if boundary(last, ch) {
                out.push(' ');
            }
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}
