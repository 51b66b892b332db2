// Marker batch protocol
//
// Fragments travel to the engine as one string of `[#i#] text` lines and are
// recovered by locating every marker in the output. Recovery is all or
// nothing: a single missing marker invalidates the whole batch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::core::types::LanguageCode;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[#(\d+)#\]").expect("marker pattern is a valid regex"));

pub fn marker(index: usize) -> String {
    format!("[#{}#]", index)
}

/// Join fragments into a single marker-tagged request body
pub fn join_with_markers(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{} {}", marker(i), text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recover `expected` segments from a translated batch.
///
/// A segment runs from its marker to the next marker of any index, or to the
/// end of the output, and is trimmed. Engines sometimes reorder markers, so
/// segments are looked up by index rather than by position.
///
/// Returns `None` unless every index in `0..expected` is present exactly once.
pub fn split_markers(output: &str, expected: usize) -> Option<Vec<String>> {
    let matches: Vec<(usize, usize, Option<usize>)> = MARKER
        .captures_iter(output)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let index = caps[1].parse::<usize>().ok();
            Some((whole.start(), whole.end(), index))
        })
        .collect();

    let mut segments: HashMap<usize, String> = HashMap::with_capacity(expected);
    for (pos, &(_, content_start, index)) in matches.iter().enumerate() {
        let Some(index) = index else { continue };
        if index >= expected {
            continue;
        }
        if segments.contains_key(&index) {
            return None;
        }
        let content_end = matches.get(pos + 1).map(|m| m.0).unwrap_or(output.len());
        segments.insert(index, output[content_start..content_end].trim().to_string());
    }

    (0..expected).map(|i| segments.remove(&i)).collect()
}

/// True when `text` already carries something shaped like a batch marker
pub fn contains_marker(text: &str) -> bool {
    MARKER.is_match(text)
}

/// Normalize fragment whitespace for the source language.
///
/// CJK scripts do not separate words with spaces, so recognizer line breaks
/// are dropped entirely; other languages collapse whitespace runs to one space.
pub fn normalize(text: &str, source: LanguageCode) -> String {
    if source.is_cjk() {
        text.split_whitespace().collect()
    } else {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_join_with_markers() {
        let joined = join_with_markers(&strings(&["Hello", "World"]));
        assert_eq!(joined, "[#0#] Hello\n[#1#] World");
        assert_eq!(join_with_markers(&[]), "");
    }

    #[test]
    fn test_split_recovers_every_segment() {
        let parsed = split_markers("[#0#] Hola\n[#1#] Mundo", 2).unwrap();
        assert_eq!(parsed, vec!["Hola", "Mundo"]);
    }

    #[test]
    fn test_split_missing_marker_rejects_batch() {
        assert!(split_markers("[#0#] Hola Mundo", 2).is_none());
        assert!(split_markers("Hola\nMundo", 2).is_none());
        // A mangled marker counts as missing
        assert!(split_markers("[#0#] Hola\n[# 1 #] Mundo", 2).is_none());
    }

    #[test]
    fn test_split_handles_reordered_markers() {
        let parsed = split_markers("[#1#] Mundo [#0#] Hola", 2).unwrap();
        assert_eq!(parsed, vec!["Hola", "Mundo"]);
    }

    #[test]
    fn test_split_ignores_text_before_first_marker() {
        let parsed = split_markers("Traducción: [#0#] uno\n[#1#] dos", 2).unwrap();
        assert_eq!(parsed, vec!["uno", "dos"]);
    }

    #[test]
    fn test_split_stops_at_foreign_markers() {
        // [#7#] is out of range but still ends the previous segment
        let parsed = split_markers("[#0#] uno [#7#] ruido\n[#1#] dos", 2).unwrap();
        assert_eq!(parsed, vec!["uno", "dos"]);
    }

    #[test]
    fn test_split_allows_empty_segments() {
        let parsed = split_markers("[#0#]\n[#1#] dos", 2).unwrap();
        assert_eq!(parsed, vec!["", "dos"]);
    }

    #[test]
    fn test_split_single_fragment_keeps_inner_newlines() {
        let parsed = split_markers("[#0#] línea uno\nlínea dos\n", 1).unwrap();
        assert_eq!(parsed, vec!["línea uno\nlínea dos"]);
    }

    #[test]
    fn test_split_rejects_repeated_marker() {
        assert!(split_markers("[#0#] see [#1#] note\n[#1#] second", 2).is_none());
        // Repeated out-of-range markers are harmless
        let parsed = split_markers("[#0#] uno [#5#] x [#5#] y\n[#1#] dos", 2).unwrap();
        assert_eq!(parsed, vec!["uno", "dos"]);
    }

    #[test]
    fn test_contains_marker() {
        assert!(contains_marker("see [#1#] note"));
        assert!(!contains_marker("see [# 1 #] note"));
        assert!(!contains_marker("plain text"));
    }

    #[test]
    fn test_normalize_cjk_removes_whitespace() {
        assert_eq!(normalize("こんにちは\n世界", LanguageCode::Ja), "こんにちは世界");
        assert_eq!(normalize(" 你 好 ", LanguageCode::Zh), "你好");
        assert_eq!(normalize("안녕 하세요", LanguageCode::Ko), "안녕하세요");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("Hello\n  World", LanguageCode::En), "Hello World");
        assert_eq!(normalize("  \t ", LanguageCode::Es), "");
    }
}
