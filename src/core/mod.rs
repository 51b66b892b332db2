pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, TranslationSettings};
pub use errors::{ConfigError, EngineError, PipelineError, UnknownLanguage};
pub use types::{
    LanguageCode, LanguagePair, NetworkPolicy, PageImage, RecognitionOutcome, RecognizedBlock,
    Rect, ScriptFamily, TranslatedBlock, TranslationResult,
};
