//! Name and description extraction from listing text.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const MAX_NAME_CHARS: usize = 60;
const MIN_TRANSITION_TAIL: usize = 10;

/// Which heuristic split the name from the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMethod {
    Separator,
    ShortNameLongText,
    ScriptTransition,
    Whitespace,
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n|\r|\t| {2,}").expect("static regex"))
}

fn short_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(\S.{0,29}?)\s+(\S.{19,})$").expect("static regex"))
}

fn boilerplate_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)\breviews?\s*\(?\s*[\d,]+\s*\)?",
            r"(?i)\bratings?\s*:?\s*[\d.]+",
            r"(?i)\blikes?\s*[\d,]+",
            r"리뷰\s*\(?\s*[\d,]+\s*\)?",
            r"후기\s*\(?\s*[\d,]+\s*\)?",
            r"평점\s*:?\s*[\d.]+",
            r"좋아요\s*[\d,]+",
            r"조회수?\s*[\d,]+",
            r"[★☆]+\s*[\d.]*",
            r"\b\d(?:\.\d)?\s*/\s*5(?:\.0)?\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips review/rating boilerplate and collapses whitespace.
pub fn clean_description(text: &str) -> String {
    let mut cleaned = text.to_string();
    for re in boilerplate_res() {
        cleaned = re.replace_all(&cleaned, " ").into_owned();
    }
    collapse_whitespace(&cleaned)
}

/// First match of the source id pattern in `url`, or an empty string.
pub fn source_local_id(url: &str, id_pattern: &Regex) -> String {
    id_pattern
        .find(url)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Place name from the detail URL path, e.g. `/attractions/N-Seoul-Tower/KOP123`.
pub fn name_from_url(url: &Url, id_pattern: &Regex, generic_segments: &[String]) -> Option<String> {
    let segments = url.path_segments()?;

    let candidate = segments
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| urlencoding::decode(segment).ok().map(|s| s.into_owned()))
        .filter(|segment| !id_pattern.is_match(segment))
        .filter(|segment| {
            !generic_segments
                .iter()
                .any(|generic| generic.eq_ignore_ascii_case(segment))
        })
        .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .filter(|segment| !segment.contains('.'))
        .last()?;

    let name = collapse_whitespace(&candidate.replace(['-', '_', '+'], " "));
    if name.chars().any(char::is_alphanumeric) && name.chars().count() <= MAX_NAME_CHARS {
        Some(name)
    } else {
        None
    }
}

/// Name from the rendered text: the first separated line, when short enough.
pub fn name_from_text(text: &str) -> Option<String> {
    separator_re()
        .split(text)
        .map(collapse_whitespace)
        .find(|part| !part.is_empty())
        .filter(|part| part.chars().count() <= MAX_NAME_CHARS)
}

/// Splits the description off the name-bearing text, trying each heuristic in order.
pub fn extract_description(text: &str, name: &str) -> Option<(String, SplitMethod)> {
    split_by_separator(text, name)
        .map(|d| (d, SplitMethod::Separator))
        .or_else(|| split_short_name(text, name).map(|d| (d, SplitMethod::ShortNameLongText)))
        .or_else(|| split_script_transition(text).map(|d| (d, SplitMethod::ScriptTransition)))
        .or_else(|| split_whitespace(text, name).map(|d| (d, SplitMethod::Whitespace)))
        .map(|(d, method)| (clean_description(&d), method))
        .filter(|(d, _)| !d.is_empty())
}

fn split_by_separator(text: &str, name: &str) -> Option<String> {
    let parts: Vec<String> = separator_re()
        .split(text)
        .map(collapse_whitespace)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 2 {
        return None;
    }

    let name = collapse_whitespace(name);
    let start = parts
        .iter()
        .position(|part| *part == name)
        .map(|i| i + 1)
        .unwrap_or(1);
    let rest = parts.get(start..)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.join(" "))
}

fn split_short_name(text: &str, name: &str) -> Option<String> {
    let text = collapse_whitespace(text);
    let name = collapse_whitespace(name);

    if !name.is_empty() {
        if let Some(rest) = text.strip_prefix(&name) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }

    short_name_re()
        .captures(&text)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Hangul,
    Latin,
}

fn script_of(c: char) -> Option<Script> {
    match c {
        '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}' => {
            Some(Script::Hangul)
        }
        c if c.is_ascii_alphabetic() => Some(Script::Latin),
        _ => None,
    }
}

/// "경복궁Gyeongbokgung Palace was..." splits where Hangul turns into Latin (or back).
fn split_script_transition(text: &str) -> Option<String> {
    let text = collapse_whitespace(text);
    let mut first: Option<Script> = None;
    let mut seen = 0usize;

    for (index, c) in text.char_indices() {
        let Some(script) = script_of(c) else {
            continue;
        };
        match first {
            None => first = Some(script),
            Some(initial) if script != initial && seen >= 2 => {
                let tail = text[index..].trim();
                return (tail.chars().count() >= MIN_TRANSITION_TAIL).then(|| tail.to_string());
            }
            Some(_) => {}
        }
        seen += 1;
    }
    None
}

fn split_whitespace(text: &str, name: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let skip = name.split_whitespace().count().max(1);
    if tokens.len() <= skip {
        return None;
    }
    Some(tokens[skip..].join(" "))
}
