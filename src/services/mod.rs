pub mod engines;
pub mod language;
pub mod ocr;
pub mod remote;
pub mod translation;

#[cfg(test)]
pub mod mock;

// Re-export commonly used services
pub use engines::{LanguageIdentifier, ModelManager, RecognitionEngine, TranslationEngine, TranslatorHandle};
pub use language::LanguageResolver;
pub use ocr::RecognitionCoordinator;
pub use remote::{HttpTransport, LibreTranslate, RemoteRecognizer};
pub use translation::{TranslationCache, TranslationOrchestrator};
