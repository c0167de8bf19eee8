use std::sync::LazyLock;

use regex::Regex;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]*)(?:\|[^\]]*)?\]\]").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKey {
    /// 1-based positional index, also used for explicit `2=...` parameters.
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub params: Vec<(ParamKey, String)>,
    pub raw: String,
}

impl Template {
    /// Positional parameter `n` (1-based), trimmed and non-empty.
    pub fn positional(&self, n: usize) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| *k == ParamKey::Index(n))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty named parameter among `names` (case-insensitive).
    pub fn named(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|want| {
            self.params
                .iter()
                .rev()
                .find(|(k, _)| matches!(k, ParamKey::Name(n) if n.to_lowercase() == *want))
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.is_empty())
        })
    }
}

/// Every `{{...}}` invocation in the text, nested ones included, in order of
/// their opening braces. Comments are dropped first; unbalanced braces are
/// ignored.
pub fn scan_templates(wikitext: &str) -> Vec<Template> {
    let text = COMMENT_RE.replace_all(wikitext, "");
    let bytes = text.as_bytes();
    let mut open: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                open.push(i);
                i += 2;
            }
            (b'}', b'}') => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 2));
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    spans.sort_by_key(|(start, _)| *start);
    spans
        .into_iter()
        .filter_map(|(start, end)| parse_template(&text[start..end]))
        .collect()
}

fn parse_template(raw: &str) -> Option<Template> {
    let inner = &raw[2..raw.len() - 2];
    let mut parts = split_top_level(inner).into_iter();
    let name = parts.next()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    let mut next_index = 1;
    for part in parts {
        match top_level_eq(part) {
            Some(eq) => {
                let key = part[..eq].trim();
                let value = clean_value(&part[eq + 1..]);
                match key.parse::<usize>() {
                    Ok(n) => params.push((ParamKey::Index(n), value)),
                    Err(_) => params.push((ParamKey::Name(key.to_string()), value)),
                }
            }
            None => {
                params.push((ParamKey::Index(next_index), clean_value(part)));
                next_index += 1;
            }
        }
    }

    Some(Template {
        name,
        params,
        raw: raw.to_string(),
    })
}

/// Split on `|` outside nested `{{ }}` and `[[ ]]`.
fn split_top_level(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        let pair = (bytes[i], bytes.get(i + 1).copied().unwrap_or(0));
        match pair {
            (b'{', b'{') | (b'[', b'[') => {
                depth += 1;
                i += 2;
            }
            (b'}', b'}') | (b']', b']') => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            (b'|', _) if depth == 0 => {
                parts.push(&s[last..i]);
                last = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parts.push(&s[last..]);
    parts
}

/// Byte offset of the first `=` outside nested markup.
fn top_level_eq(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let pair = (bytes[i], bytes.get(i + 1).copied().unwrap_or(0));
        match pair {
            (b'{', b'{') | (b'[', b'[') => {
                depth += 1;
                i += 2;
            }
            (b'}', b'}') | (b']', b']') => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            (b'=', _) if depth == 0 => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Trim and reduce `[[Target|label]]` to `Target`.
fn clean_value(s: &str) -> String {
    WIKILINK_RE.replace_all(s.trim(), "$1").trim().to_string()
}
