// Contracts for the external engines the pipeline orchestrates
//
// Recognition, identification and translation models are opaque; the
// pipeline only needs these calls. Every call completes exactly once with a
// value or an error, and none of them is expected to support cancellation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::errors::EngineResult;
use crate::core::types::{LanguageCode, LanguagePair, NetworkPolicy, PageImage, RecognizedBlock};

/// One recognizer per script family.
///
/// Distinct engine instances must be safe to call concurrently.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Recognize text blocks in an encoded page image (possibly none)
    async fn process(&self, image: &PageImage) -> EngineResult<Vec<RecognizedBlock>>;

    /// Release the engine. Called once at teardown.
    fn close(&self) {}
}

/// Language identification service
#[async_trait]
pub trait LanguageIdentifier: Send + Sync {
    /// Returns a language code, or `"und"` when the service cannot decide
    async fn identify(&self, text: &str) -> EngineResult<String>;
}

/// Factory for translator instances bound to a language pair
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Open a translator; may start fetching the pair's model in the background
    async fn open(&self, pair: LanguagePair) -> EngineResult<Arc<dyn TranslatorHandle>>;
}

/// An opened translator instance
#[async_trait]
pub trait TranslatorHandle: Send + Sync {
    fn pair(&self) -> LanguagePair;

    async fn translate(&self, text: &str) -> EngineResult<String>;

    /// Release the instance. Further `translate` calls fail.
    fn close(&self);
}

/// On-device model availability
#[async_trait]
pub trait ModelManager: Send + Sync {
    async fn is_downloaded(&self, lang: LanguageCode) -> EngineResult<bool>;

    async fn download(&self, lang: LanguageCode, policy: NetworkPolicy) -> EngineResult<()>;
}
