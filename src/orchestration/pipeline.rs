// Translation pipeline: page image → recognize → resolve → translate → geometry

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::core::config::{Config, TranslationSettings};
use crate::core::errors::{ConfigError, PipelineError};
use crate::core::types::{merged_text, LanguageCode, PageImage, ScriptFamily, TranslationResult};
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::services::engines::RecognitionEngine;
use crate::services::language::LanguageResolver;
use crate::services::ocr::RecognitionCoordinator;
use crate::services::remote::{HttpTransport, LibreTranslate, RemoteRecognizer};
use crate::services::translation::{TranslationCache, TranslationOrchestrator};
use crate::utils::{probe_page_image_async, Metrics};

/// Owns the recognition, language and translation components for the
/// lifetime of the process and runs pages through them.
pub struct TranslationPipeline {
    settings: RwLock<TranslationSettings>,
    recognizer: RecognitionCoordinator,
    resolver: LanguageResolver,
    translator: TranslationOrchestrator,
    metrics: Metrics,
    closed: AtomicBool,
}

impl TranslationPipeline {
    /// Wire already-built components and open the primary translator for the
    /// configured pair
    pub async fn new(
        settings: TranslationSettings,
        recognizer: RecognitionCoordinator,
        resolver: LanguageResolver,
        translator: TranslationOrchestrator,
        metrics: Metrics,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;

        translator
            .update_languages(settings.source_lang, settings.target_lang)
            .await;

        Ok(Self {
            settings: RwLock::new(settings),
            recognizer,
            resolver,
            translator,
            metrics,
            closed: AtomicBool::new(false),
        })
    }

    /// Build the pipeline against the remote engines named in `config`
    #[instrument(skip(config))]
    pub async fn from_config(config: &Config) -> Result<Self> {
        info!("Initializing engines...");

        let metrics = Metrics::new();
        let timeout = config.engine_timeout();
        let transport = |name: &'static str| -> Result<HttpTransport> {
            Ok(HttpTransport::new(timeout, config.max_retries())?
                .with_circuit_breaker(CircuitBreaker::new(name).with_metrics(metrics.clone())))
        };

        let mut engines: Vec<(ScriptFamily, Arc<dyn RecognitionEngine>)> = Vec::new();
        for family in ScriptFamily::ALL {
            let url = config.engines.ocr_url(family);
            let engine: Arc<dyn RecognitionEngine> =
                Arc::new(RemoteRecognizer::new(family, url, transport(family.name())?));
            debug!("{} recognizer at {}", family, url);
            engines.push((family, engine));
        }
        let recognizer = RecognitionCoordinator::new(engines, timeout, Some(metrics.clone()));

        let libre = Arc::new(LibreTranslate::new(
            &config.engines.libretranslate_url,
            config.engines.libretranslate_api_key.clone(),
            transport("libretranslate")?,
            config.network.metered,
        ));

        // Separate unguarded client; the resolver's breaker is the only one
        // in front of identification
        let identifier = Arc::new(LibreTranslate::new(
            &config.engines.libretranslate_url,
            config.engines.libretranslate_api_key.clone(),
            HttpTransport::new(timeout, config.max_retries())?,
            config.network.metered,
        ));

        let resolver = LanguageResolver::new(
            identifier,
            timeout,
            Some(CircuitBreaker::new("language identification").with_metrics(metrics.clone())),
            Some(metrics.clone()),
        );

        let mut translator = TranslationOrchestrator::new(libre.clone(), libre, timeout)
            .with_metrics(metrics.clone());

        if config.cache.enabled {
            let cache = TranslationCache::new(
                &config.cache.cache_dir,
                config.cache.max_entries,
                Some(std::time::Duration::from_secs(30)),
                Some(metrics.clone()),
            )
            .await
            .context("Failed to open translation cache")?;
            let (entries, size_mb) = cache.stats().await;
            info!("Translation cache: {} entries ({:.2} MB)", entries, size_mb);
            translator = translator.with_cache(cache);
        }

        let pipeline = Self::new(
            config.translation.clone(),
            recognizer,
            resolver,
            translator,
            metrics,
        )
        .await
        .context("Invalid translation settings")?;

        info!(
            "✓ Ready ({} -> {}, translation {})",
            config.translation.source_lang,
            config.translation.target_lang,
            if config.translation.enabled { "enabled" } else { "disabled" }
        );

        Ok(pipeline)
    }

    /// Translate one page.
    ///
    /// `None` when translation is disabled or no text was found. Engine
    /// failures degrade to untranslated text and never surface here.
    #[instrument(skip(self, image), fields(width = image.width, height = image.height))]
    pub async fn process(&self, image: &PageImage) -> Option<TranslationResult> {
        let start = Instant::now();
        let settings = self.settings();

        if !settings.enabled {
            debug!("Translation disabled");
            return None;
        }

        let blocks = self.recognizer.recognize(image, settings.source_lang).await?;

        let source = if settings.source_lang.is_auto() {
            self.resolver.resolve(&merged_text(&blocks)).await
        } else {
            settings.source_lang
        };

        let translated = self
            .translator
            .translate(&blocks, source, settings.target_lang)
            .await;

        let result = TranslationResult::new(&blocks, translated, source, settings.target_lang);
        self.metrics.record_page_processed(start.elapsed());

        info!(
            "Translated {} blocks {} -> {} in {:.1}ms",
            result.blocks().len(),
            source,
            settings.target_lang,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Some(result)
    }

    /// Probe encoded bytes, then [`TranslationPipeline::process`] them
    pub async fn process_bytes(&self, bytes: Vec<u8>) -> Result<Option<TranslationResult>, PipelineError> {
        let image = probe_page_image_async(bytes).await?;
        Ok(self.process(&image).await)
    }

    /// Replace the settings; reopens the primary translator when the pair changed
    pub async fn update_settings(&self, settings: TranslationSettings) -> Result<(), ConfigError> {
        settings.validate()?;

        let previous = {
            let mut current = self.settings.write();
            std::mem::replace(&mut *current, settings.clone())
        };

        if previous.source_lang != settings.source_lang || previous.target_lang != settings.target_lang {
            info!(
                "Language pair changed: {} -> {} becomes {} -> {}",
                previous.source_lang, previous.target_lang, settings.source_lang, settings.target_lang
            );
            self.translator
                .update_languages(settings.source_lang, settings.target_lang)
                .await;
        }

        Ok(())
    }

    pub fn settings(&self) -> TranslationSettings {
        self.settings.read().clone()
    }

    pub fn translator(&self) -> &TranslationOrchestrator {
        &self.translator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn is_model_downloaded(&self, lang: LanguageCode) -> bool {
        self.translator.is_model_downloaded(lang).await
    }

    pub async fn download_model(&self, lang: LanguageCode) -> bool {
        self.translator.download_model(lang).await
    }

    /// Release every engine. Only the first call has any effect.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down pipeline");
        self.recognizer.shutdown();
        self.translator.shutdown().await;
    }
}
