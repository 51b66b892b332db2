// Library exports for the page recognition and translation pipeline

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{Config, TranslationSettings},
    errors::{ConfigError, EngineError, PipelineError, UnknownLanguage},
    types::{
        LanguageCode, LanguagePair, NetworkPolicy, PageImage, RecognizedBlock, Rect, ScriptFamily,
        TranslatedBlock, TranslationResult,
    },
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::TranslationPipeline;

pub use services::{
    LanguageResolver, LibreTranslate, RecognitionCoordinator, RemoteRecognizer, TranslationCache,
    TranslationOrchestrator,
};

pub use utils::{probe_page_image, probe_page_image_async, Metrics};
