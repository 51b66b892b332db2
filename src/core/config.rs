use crate::core::errors::{ConfigError, UnknownLanguage};
use crate::core::types::{LanguageCode, ScriptFamily};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Consumer-facing translation settings.
///
/// Owned by the surrounding settings layer; the core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationSettings {
    pub enabled: bool,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    /// Overlay font size in sp, passed through to the renderer
    pub font_size: f32,
}

impl TranslationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_lang.is_auto() {
            return Err(ConfigError::AutoTarget);
        }
        for (variable, lang) in [("source_lang", self.source_lang), ("target_lang", self.target_lang)] {
            if lang == LanguageCode::Undetermined {
                return Err(ConfigError::InvalidLanguage {
                    variable,
                    source: UnknownLanguage(lang.code().to_string()),
                });
            }
        }
        if !(8.0..=30.0).contains(&self.font_size) {
            return Err(ConfigError::InvalidFontSize(self.font_size));
        }
        Ok(())
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            source_lang: LanguageCode::Auto,
            target_lang: LanguageCode::Es,
            font_size: 16.0,
        }
    }
}

/// Remote engine endpoints and call behaviour
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub latin_ocr_url: String,
    pub chinese_ocr_url: String,
    pub japanese_ocr_url: String,
    pub korean_ocr_url: String,
    pub libretranslate_url: String,
    pub libretranslate_api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl EngineConfig {
    pub fn ocr_url(&self, family: ScriptFamily) -> &str {
        match family {
            ScriptFamily::Latin => &self.latin_ocr_url,
            ScriptFamily::Chinese => &self.chinese_ocr_url,
            ScriptFamily::Japanese => &self.japanese_ocr_url,
            ScriptFamily::Korean => &self.korean_ocr_url,
        }
    }
}

/// Connectivity facts used to gate model downloads
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub metered: bool,
}

/// Translation cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub max_entries: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub translation: TranslationSettings,
    pub engines: EngineConfig,
    pub network: NetworkConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let ocr_url = |variable: &str, family: ScriptFamily| {
            env::var(variable)
                .unwrap_or_else(|_| format!("http://127.0.0.1:8866/{}", family.name()))
        };

        Ok(Self {
            server: ServerConfig {
                port: parse_env("SERVER_PORT", 1420)?,
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            translation: TranslationSettings {
                enabled: parse_env("TRANSLATION_ENABLED", true)?,
                source_lang: language_env("TRANSLATION_SOURCE_LANG", LanguageCode::Auto)?,
                target_lang: language_env("TRANSLATION_TARGET_LANG", LanguageCode::Es)?,
                font_size: parse_env("TRANSLATION_FONT_SIZE", 16.0)?,
            },
            engines: EngineConfig {
                latin_ocr_url: ocr_url("OCR_LATIN_URL", ScriptFamily::Latin),
                chinese_ocr_url: ocr_url("OCR_CHINESE_URL", ScriptFamily::Chinese),
                japanese_ocr_url: ocr_url("OCR_JAPANESE_URL", ScriptFamily::Japanese),
                korean_ocr_url: ocr_url("OCR_KOREAN_URL", ScriptFamily::Korean),
                libretranslate_url: env::var("LIBRETRANSLATE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
                libretranslate_api_key: env::var("LIBRETRANSLATE_API_KEY")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                timeout: Duration::from_secs(parse_env("ENGINE_TIMEOUT_SECONDS", 30)?),
                max_retries: parse_env("MAX_RETRIES", 2)?,
            },
            network: NetworkConfig {
                metered: parse_env("METERED_CONNECTION", false)?,
            },
            cache: CacheConfig {
                enabled: parse_env("CACHE_ENABLED", true)?,
                cache_dir: PathBuf::from(
                    env::var("CACHE_DIR").unwrap_or_else(|_| ".cache".to_string()),
                ),
                max_entries: parse_env("CACHE_MAX_ENTRIES", 10_000)?,
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.translation.validate()?;

        let urls = [
            ("OCR_LATIN_URL", &self.engines.latin_ocr_url),
            ("OCR_CHINESE_URL", &self.engines.chinese_ocr_url),
            ("OCR_JAPANESE_URL", &self.engines.japanese_ocr_url),
            ("OCR_KOREAN_URL", &self.engines.korean_ocr_url),
            ("LIBRETRANSLATE_URL", &self.engines.libretranslate_url),
        ];
        for (variable, value) in urls {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl {
                    variable,
                    value: value.clone(),
                });
            }
        }

        if self.engines.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidCacheSize);
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn engine_timeout(&self) -> Duration {
        self.engines.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.engines.max_retries
    }
}

/// Read a typed variable, falling back to `default` when unset.
///
/// A set but unparseable value is an error rather than a silent default.
fn parse_env<T: std::str::FromStr>(variable: &str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarError(format!("{}={}", variable, raw))),
        _ => Ok(default),
    }
}

fn language_env(variable: &'static str, default: LanguageCode) -> Result<LanguageCode, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .parse()
            .map_err(|source| ConfigError::InvalidLanguage { variable, source }),
        _ => Ok(default),
    }
}
