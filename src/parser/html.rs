use std::sync::LazyLock;

use regex::Regex;

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#([xX]?[0-9a-fA-F]+);").unwrap());

/// ASCII case-insensitive substring search starting at `from`.
pub fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from > hay.len() {
        return None;
    }
    hay[from..]
        .windows(pat.len())
        .position(|w| w.eq_ignore_ascii_case(pat))
        .map(|p| p + from)
}

/// Value of `name="…"` inside one opening tag. Accepts single-quoted,
/// double-quoted and bare values.
pub fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(at) = find_ci(tag, name, from) {
        let preceded = at > 0 && tag.as_bytes()[at - 1].is_ascii_whitespace();
        let rest = tag[at + name.len()..].trim_start();
        if preceded && rest.starts_with('=') {
            let rest = rest[1..].trim_start();
            return match rest.as_bytes().first() {
                Some(b'"') => rest[1..].find('"').map(|end| &rest[1..1 + end]),
                Some(b'\'') => rest[1..].find('\'').map(|end| &rest[1..1 + end]),
                _ => {
                    let end = rest
                        .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
                        .unwrap_or(rest.len());
                    Some(&rest[..end])
                }
            };
        }
        from = at + name.len();
    }
    None
}

/// True when the tag's space-separated class attribute contains `token`.
pub fn has_class(tag: &str, token: &str) -> bool {
    attr(tag, "class").is_some_and(|v| {
        v.split_ascii_whitespace()
            .any(|c| c.eq_ignore_ascii_case(token))
    })
}

/// Inner HTML of every `<tag class="…token…">` element, in document order.
/// Nested elements with the same tag name are kept inside their parent's
/// slice rather than terminating it early.
pub fn class_blocks<'a>(html: &'a str, tag: &str, token: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some((start, open_end)) = next_open(html, tag, cursor) {
        if has_class(&html[start..open_end], token) {
            if let Some(inner) = element_inner(html, tag, open_end) {
                out.push(inner);
                cursor = open_end + inner.len();
                continue;
            }
        }
        cursor = open_end;
    }
    out
}

/// The opening tag text of the first `<tag …>` whose `name` attribute equals
/// `value`. Used for void elements like `<meta>` that have no inner HTML.
pub fn tag_with_attr<'a>(html: &'a str, tag: &str, name: &str, value: &str) -> Option<&'a str> {
    let mut cursor = 0;
    while let Some((start, open_end)) = next_open(html, tag, cursor) {
        let open_tag = &html[start..open_end];
        if attr(open_tag, name).is_some_and(|v| v.eq_ignore_ascii_case(value)) {
            return Some(open_tag);
        }
        cursor = open_end;
    }
    None
}

/// Visible text of a fragment: tags stripped, entities decoded, outer
/// whitespace trimmed.
pub fn text(fragment: &str) -> String {
    decode_entities(&strip_tags(fragment)).trim().to_string()
}

pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Decodes the named entities this markup actually uses plus numeric
/// references. `&amp;` goes last so `&amp;#39;` stays a literal reference.
pub fn decode_entities(s: &str) -> String {
    let s = s
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    let s = NUMERIC_ENTITY_RE.replace_all(&s, |caps: &regex::Captures| {
        let body = &caps[1];
        let code = match body.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => body.parse::<u32>(),
        };
        code.ok()
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });
    s.replace("&amp;", "&")
}

/// Next `<tag` opening at or after `from`: (tag start, end past the `>`).
fn next_open(html: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let pat = format!("<{tag}");
    let mut at = from;
    while let Some(start) = find_ci(html, &pat, at) {
        let boundary = html.as_bytes().get(start + pat.len()).copied();
        if matches!(boundary, Some(b'>') | Some(b'/'))
            || boundary.is_some_and(|b| b.is_ascii_whitespace())
        {
            let open_end = html[start..].find('>')? + start + 1;
            return Some((start, open_end));
        }
        at = start + pat.len();
    }
    None
}

/// Inner HTML of the element whose open tag ends at `open_end`, walking past
/// nested same-name elements to the matching close tag.
fn element_inner<'a>(html: &'a str, tag: &str, open_end: usize) -> Option<&'a str> {
    let close = format!("</{tag}");
    let mut depth = 1usize;
    let mut cursor = open_end;
    loop {
        let next_close = find_ci(html, &close, cursor)?;
        match next_open(html, tag, cursor) {
            Some((start, inner_open_end)) if start < next_close => {
                depth += 1;
                cursor = inner_open_end;
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(&html[open_end..next_close]);
                }
                cursor = next_close + close.len();
            }
        }
    }
}
