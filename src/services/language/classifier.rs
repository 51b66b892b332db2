// Script classifier: a pure Unicode-range heuristic, no external calls

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::LanguageCode;

/// Share of CJK-range characters above which the text is treated as CJK
const CJK_RATIO_THRESHOLD: f64 = 0.3;

/// Diacritic signatures, checked in this order; the first hit wins.
///
/// The Spanish class is deliberately broad and shadows most of the later
/// ones. Only `œ` (French) and `ß` (German) can reach past it.
static DIACRITIC_SIGNATURES: Lazy<Vec<(LanguageCode, Regex)>> = Lazy::new(|| {
    [
        (LanguageCode::Es, "àáâãäåæçèéêëìíîïðñòóôõöøùúûüýþÿ"),
        (LanguageCode::Fr, "àâæçéèêëïîôœùûüÿ"),
        (LanguageCode::De, "äöüß"),
        (LanguageCode::Pt, "àáâãçéêíóôõú"),
        (LanguageCode::It, "àáéèíìóòú"),
    ]
    .into_iter()
    .map(|(lang, class)| {
        let pattern = format!("(?i)[{}]", class);
        (lang, Regex::new(&pattern).expect("diacritic class is a valid regex"))
    })
    .collect()
});

#[derive(Debug, Default)]
struct ScriptCounts {
    total: usize,
    cjk: usize,
    han: usize,
    kana: usize,
    hangul: usize,
    latin: usize,
}

impl ScriptCounts {
    fn scan(text: &str) -> Self {
        let mut counts = Self::default();
        for ch in text.chars() {
            counts.total += 1;
            let cp = ch as u32;
            match cp {
                0x4E00..=0x9FFF => {
                    counts.cjk += 1;
                    counts.han += 1;
                }
                0x3040..=0x309F | 0x30A0..=0x30FF => {
                    counts.cjk += 1;
                    counts.kana += 1;
                }
                0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => {
                    counts.cjk += 1;
                    counts.hangul += 1;
                }
                _ if ch.is_ascii_alphabetic() => counts.latin += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Assign a language code from script ranges and diacritics.
///
/// Total and pure: never fails, defaults to `en`.
pub fn classify(text: &str) -> LanguageCode {
    let clean = text.trim();
    if clean.is_empty() {
        return LanguageCode::En;
    }

    let counts = ScriptCounts::scan(clean);
    if counts.cjk as f64 / counts.total as f64 > CJK_RATIO_THRESHOLD {
        // Precedence is a tie-break, not a frequency ranking
        return if counts.hangul > 0 {
            LanguageCode::Ko
        } else if counts.kana > 0 {
            LanguageCode::Ja
        } else {
            LanguageCode::Zh
        };
    }

    // Signatures match anywhere in the text, including multi-line merged
    // page text. The Android reader's whole-string match failed on any line
    // break and sent such pages to the identification service instead.
    DIACRITIC_SIGNATURES
        .iter()
        .find(|(_, signature)| signature.is_match(clean))
        .map(|(lang, _)| *lang)
        .unwrap_or(LanguageCode::En)
}

/// True if the text has at least one ASCII Latin letter
pub fn contains_latin(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

/// Han, kana or hangul code point
pub fn is_cjk_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF
            | 0x3040..=0x309F
            | 0x30A0..=0x30FF
            | 0xAC00..=0xD7AF
            | 0x1100..=0x11FF
            | 0x3130..=0x318F
    )
}
