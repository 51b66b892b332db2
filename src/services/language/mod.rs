// Source-language resolution: script heuristic plus external identification

pub mod classifier;
pub mod resolver;

pub use classifier::{classify, contains_latin, is_cjk_char};
pub use resolver::LanguageResolver;
