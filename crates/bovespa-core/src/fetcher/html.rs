//! Case-insensitive tag scanning over raw HTML.
//!
//! Only what the portfolio page needs: locate element blocks by tag name and
//! flatten a block to its text. ASCII lowercasing keeps byte offsets stable,
//! so positions found in the lowered copy index the original string.

/// Byte range of one element, from `<tag` through its inner content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Byte offset of `<` in the scanned source.
    pub start: usize,
    /// Whole block, including the opening tag.
    pub outer: &'a str,
    /// Content between the opening tag and the close (or the next sibling).
    pub inner: &'a str,
    /// The opening tag itself, attributes included.
    pub open_tag: &'a str,
}

/// All `tag` blocks in `src`, in document order.
///
/// A block ends at its closing tag or at the next opening tag of the same
/// name, whichever comes first, so unclosed `<tr>`/`<td>` still split.
pub fn element_blocks<'a>(src: &'a str, tag: &str) -> Vec<Block<'a>> {
    let lower = src.to_ascii_lowercase();
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}", tag.to_ascii_lowercase());

    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(start) = find_open(&lower, &open_pat, cursor) {
        let Some(open_end) = lower[start..].find('>').map(|i| start + i + 1) else {
            break;
        };

        let close = lower[open_end..].find(&close_pat).map(|i| open_end + i);
        let next_open = find_open(&lower, &open_pat, open_end);
        let inner_end = match (close, next_open) {
            (Some(c), Some(n)) => c.min(n),
            (Some(c), None) => c,
            (None, Some(n)) => n,
            (None, None) => src.len(),
        };

        blocks.push(Block {
            start,
            outer: &src[start..inner_end],
            inner: &src[open_end..inner_end],
            open_tag: &src[start..open_end],
        });
        cursor = inner_end.max(open_end);
    }
    blocks
}

/// First `tag` block whose opening tag has `class` among its classes.
pub fn block_with_class<'a>(src: &'a str, tag: &str, class: &str) -> Option<Block<'a>> {
    element_blocks(src, tag)
        .into_iter()
        .find(|block| has_class(block.open_tag, class))
}

fn has_class(open_tag: &str, class: &str) -> bool {
    let lower = open_tag.to_ascii_lowercase();
    let Some(pos) = lower.find("class=") else {
        return false;
    };
    let rest = &open_tag[pos + "class=".len()..];
    let value = match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => rest[1..].split(quote).next().unwrap_or(""),
        _ => rest
            .split(|c: char| c.is_whitespace() || c == '>')
            .next()
            .unwrap_or(""),
    };
    value
        .split_whitespace()
        .any(|candidate| candidate.eq_ignore_ascii_case(class))
}

/// Opening tag at or after `from` whose name is exactly `open_pat[1..]`.
fn find_open(lower: &str, open_pat: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(rel) = lower.get(cursor..)?.find(open_pat) {
        let start = cursor + rel;
        let after = start + open_pat.len();
        match lower.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(start),
            None => return None,
            _ => cursor = after,
        }
    }
    None
}

/// Text content of an HTML fragment with tags removed, entities decoded and
/// whitespace collapsed.
pub fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    normalize_ws(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
