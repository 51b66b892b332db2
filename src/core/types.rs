// Shared data model for recognition, language resolution and translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::errors::UnknownLanguage;

/// Language codes understood by the pipeline.
///
/// `Auto` is a configuration sentinel and never a detection result.
/// `Undetermined` is what the identification service reports when it
/// cannot decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    Auto,
    En,
    Es,
    Ja,
    Ko,
    Zh,
    Fr,
    De,
    Pt,
    It,
    #[serde(rename = "und")]
    Undetermined,
}

impl LanguageCode {
    /// Every selectable code, in settings order
    pub const ALL: [LanguageCode; 10] = [
        LanguageCode::Auto,
        LanguageCode::En,
        LanguageCode::Es,
        LanguageCode::Ja,
        LanguageCode::Ko,
        LanguageCode::Zh,
        LanguageCode::Fr,
        LanguageCode::De,
        LanguageCode::Pt,
        LanguageCode::It,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            LanguageCode::Auto => "auto",
            LanguageCode::En => "en",
            LanguageCode::Es => "es",
            LanguageCode::Ja => "ja",
            LanguageCode::Ko => "ko",
            LanguageCode::Zh => "zh",
            LanguageCode::Fr => "fr",
            LanguageCode::De => "de",
            LanguageCode::Pt => "pt",
            LanguageCode::It => "it",
            LanguageCode::Undetermined => "und",
        }
    }

    pub fn is_auto(self) -> bool {
        self == LanguageCode::Auto
    }

    /// Scripts written without word-separating spaces
    pub fn is_cjk(self) -> bool {
        matches!(self, LanguageCode::Ja | LanguageCode::Ko | LanguageCode::Zh)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LanguageCode {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        LanguageCode::ALL
            .into_iter()
            .chain(std::iter::once(LanguageCode::Undetermined))
            .find(|lang| lang.code() == normalized)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Source/target pair a translator instance is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: LanguageCode,
    pub target: LanguageCode,
}

impl LanguagePair {
    pub fn new(source: LanguageCode, target: LanguageCode) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// Writing-system families with a dedicated recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFamily {
    Latin,
    Chinese,
    Japanese,
    Korean,
}

impl ScriptFamily {
    /// Registration order; arbitration ties go to the earlier family
    pub const ALL: [ScriptFamily; 4] = [
        ScriptFamily::Latin,
        ScriptFamily::Chinese,
        ScriptFamily::Japanese,
        ScriptFamily::Korean,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ScriptFamily::Latin => "latin",
            ScriptFamily::Chinese => "chinese",
            ScriptFamily::Japanese => "japanese",
            ScriptFamily::Korean => "korean",
        }
    }

    /// Engines worth running for a source-language hint.
    ///
    /// Only `en` and `es` narrow recognition to the Latin engine; other
    /// Latin-script codes fall through to the full set like `auto` does.
    pub fn for_hint(hint: LanguageCode) -> &'static [ScriptFamily] {
        match hint {
            LanguageCode::Zh => &[ScriptFamily::Chinese],
            LanguageCode::Ja => &[ScriptFamily::Japanese],
            LanguageCode::Ko => &[ScriptFamily::Korean],
            LanguageCode::En | LanguageCode::Es => &[ScriptFamily::Latin],
            _ => &Self::ALL,
        }
    }
}

impl fmt::Display for ScriptFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Axis-aligned rectangle in page pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// One spatially-bounded unit of recognized text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedBlock {
    pub text: String,
    pub bounding_box: Rect,
}

impl RecognizedBlock {
    pub fn new(text: impl Into<String>, bounding_box: Rect) -> Self {
        Self {
            text: text.into(),
            bounding_box,
        }
    }
}

/// Blocks produced by a single engine invocation, kept only for arbitration
#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub engine: ScriptFamily,
    pub blocks: Vec<RecognizedBlock>,
}

impl RecognitionOutcome {
    /// Length of the merged text, one separator between blocks
    pub fn char_count(&self) -> usize {
        let separators = self.blocks.len().saturating_sub(1);
        self.blocks
            .iter()
            .map(|b| b.text.chars().count())
            .sum::<usize>()
            + separators
    }
}

/// Join block texts the way engines report a page's full text
pub fn merged_text(blocks: &[RecognizedBlock]) -> String {
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Translated text anchored to the source block's geometry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedBlock {
    pub text: String,
    pub rect: Rect,
}

/// Terminal artifact handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    blocks: Vec<TranslatedBlock>,
    source_lang: LanguageCode,
    target_lang: LanguageCode,
}

impl TranslationResult {
    /// Zip translated strings back onto the blocks they came from.
    ///
    /// `translated` is expected to be index-aligned with `blocks`; a block
    /// without a translation keeps an empty string.
    pub fn new(
        blocks: &[RecognizedBlock],
        translated: Vec<String>,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
    ) -> Self {
        let mut translated = translated.into_iter();
        let blocks = blocks
            .iter()
            .map(|block| TranslatedBlock {
                text: translated.next().unwrap_or_default(),
                rect: block.bounding_box,
            })
            .collect();

        Self {
            blocks,
            source_lang,
            target_lang,
        }
    }

    pub fn blocks(&self) -> &[TranslatedBlock] {
        &self.blocks
    }

    pub fn source_lang(&self) -> LanguageCode {
        self.source_lang
    }

    pub fn target_lang(&self) -> LanguageCode {
        self.target_lang
    }
}

/// Encoded page image shared between concurrent engine calls
#[derive(Debug, Clone)]
pub struct PageImage {
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Connectivity requirement for model downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPolicy {
    Any,
    UnmeteredOnly,
}
