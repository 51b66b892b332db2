pub mod batch;
pub mod cache;
pub mod orchestrator;

pub use cache::TranslationCache;
pub use orchestrator::TranslationOrchestrator;
