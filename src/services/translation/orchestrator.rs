use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, LanguagePair, NetworkPolicy, RecognizedBlock};
use crate::services::engines::{ModelManager, TranslationEngine, TranslatorHandle};
use crate::services::translation::batch::{contains_marker, join_with_markers, normalize, split_markers};
use crate::services::translation::cache::TranslationCache;
use crate::utils::Metrics;

struct OrchestratorState {
    source: LanguageCode,
    target: LanguageCode,
    primary: Option<Arc<dyn TranslatorHandle>>,
    /// Bumped on every reconfiguration; an open that finishes under an older
    /// generation is stale
    generation: u64,
    closed: bool,
}

/// Translator opened for a single request. Closed when dropped, so every exit
/// path releases it, including cancellation of the request.
struct TemporaryTranslator {
    handle: Arc<dyn TranslatorHandle>,
    metrics: Option<Metrics>,
}

impl Drop for TemporaryTranslator {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(ref m) = self.metrics {
            m.record_temporary_closed();
        }
        debug!("Closed temporary translator {}", self.handle.pair());
    }
}

enum Translator {
    Primary(Arc<dyn TranslatorHandle>),
    Temporary(TemporaryTranslator),
}

impl Translator {
    fn handle(&self) -> &dyn TranslatorHandle {
        match self {
            Translator::Primary(handle) => handle.as_ref(),
            Translator::Temporary(temp) => temp.handle.as_ref(),
        }
    }
}

/// Translates recognized fragments and manages translator lifetimes.
///
/// Owns one primary translator for the configured language pair. When the
/// configured source is `auto`, each request opens its own temporary
/// translator for the detected pair instead.
pub struct TranslationOrchestrator {
    engine: Arc<dyn TranslationEngine>,
    model_manager: Arc<dyn ModelManager>,
    state: Mutex<OrchestratorState>,
    cache: Option<TranslationCache>,
    metrics: Option<Metrics>,
    engine_timeout: Duration,
}

impl TranslationOrchestrator {
    /// Starts unconfigured; call [`TranslationOrchestrator::update_languages`]
    /// to open a primary translator
    pub fn new(
        engine: Arc<dyn TranslationEngine>,
        model_manager: Arc<dyn ModelManager>,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            model_manager,
            state: Mutex::new(OrchestratorState {
                source: LanguageCode::Auto,
                target: LanguageCode::Auto,
                primary: None,
                generation: 0,
                closed: false,
            }),
            cache: None,
            metrics: None,
            engine_timeout,
        }
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Configured (source, target)
    pub fn languages(&self) -> (LanguageCode, LanguageCode) {
        let state = self.state.lock();
        (state.source, state.target)
    }

    pub fn has_primary(&self) -> bool {
        self.state.lock().primary.is_some()
    }

    /// Reconfigure the language pair.
    ///
    /// Closes the current primary and opens a new one when the pair is
    /// concrete and not an identity pair. Open failures leave no primary.
    #[instrument(skip(self))]
    pub async fn update_languages(&self, source: LanguageCode, target: LanguageCode) {
        let (generation, previous) = {
            let mut state = self.state.lock();
            if state.closed {
                warn!("Language update after shutdown ignored");
                return;
            }
            state.generation += 1;
            state.source = source;
            state.target = target;
            (state.generation, state.primary.take())
        };

        if let Some(previous) = previous {
            previous.close();
            info!("Closed primary translator {}", previous.pair());
        }

        if source.is_auto() || target.is_auto() || source == target {
            debug!("No primary translator needed for {} -> {}", source, target);
            return;
        }

        let pair = LanguagePair::new(source, target);
        let handle = match self.open(pair).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open primary translator {}: {}", pair, e);
                return;
            }
        };

        let stale = {
            let mut state = self.state.lock();
            if state.closed || state.generation != generation {
                true
            } else {
                state.primary = Some(Arc::clone(&handle));
                false
            }
        };

        if stale {
            handle.close();
            debug!("Discarded translator {} opened for a superseded configuration", pair);
        } else {
            info!("Opened primary translator {}", pair);
        }
    }

    /// Translate fragments from `source` to `target`.
    ///
    /// Never fails: the result always has one entry per block, in order, and
    /// any fragment that could not be translated keeps its normalized text.
    #[instrument(skip(self, blocks), fields(blocks = blocks.len(), source = %source, target = %target))]
    pub async fn translate(
        &self,
        blocks: &[RecognizedBlock],
        source: LanguageCode,
        target: LanguageCode,
    ) -> Vec<String> {
        if blocks.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = blocks.iter().map(|b| normalize(&b.text, source)).collect();

        if source == target || source.is_auto() || target.is_auto() {
            debug!("Nothing to translate for {} -> {}", source, target);
            return texts;
        }

        let pair = LanguagePair::new(source, target);
        let mut results: Vec<Option<String>> = vec![None; texts.len()];

        if let Some(ref cache) = self.cache {
            for (slot, text) in results.iter_mut().zip(&texts) {
                if !text.is_empty() {
                    *slot = cache.get(&TranslationCache::generate_key(pair, text));
                }
            }
        }

        // Blank fragments stay blank without an engine call
        let pending: Vec<usize> = (0..texts.len())
            .filter(|&i| results[i].is_none() && !texts[i].is_empty())
            .collect();
        if pending.is_empty() {
            debug!("No fragment needs the engine");
            return fill(results, texts);
        }

        let Some(translator) = self.acquire(pair).await else {
            return fill(results, texts);
        };

        let pending_texts: Vec<String> = pending.iter().map(|&i| texts[i].clone()).collect();
        let translated = self.run_round(translator.handle(), &pending_texts).await;
        drop(translator);

        for (&i, outcome) in pending.iter().zip(translated) {
            if let (Some(cache), Some(text)) = (&self.cache, &outcome) {
                if !text.is_empty() {
                    cache.put(TranslationCache::generate_key(pair, &texts[i]), &texts[i], text);
                }
            }
            results[i] = outcome;
        }

        fill(results, texts)
    }

    /// Pick the translator for a round, or None to leave the texts untranslated
    async fn acquire(&self, pair: LanguagePair) -> Option<Translator> {
        let (configured_source, primary) = {
            let state = self.state.lock();
            if state.closed {
                debug!("Translation requested after shutdown");
                return None;
            }
            (state.source, state.primary.clone())
        };

        if !configured_source.is_auto() {
            match primary {
                Some(handle) if handle.pair() == pair => return Some(Translator::Primary(handle)),
                Some(handle) => {
                    debug!("Primary is bound to {}, opening {} for this request", handle.pair(), pair);
                }
                None => {
                    warn!("No primary translator for {}", pair);
                    return None;
                }
            }
        }

        match self.open(pair).await {
            Ok(handle) => {
                if let Some(ref m) = self.metrics {
                    m.record_temporary_opened();
                }
                debug!("Opened temporary translator {}", pair);
                Some(Translator::Temporary(TemporaryTranslator {
                    handle,
                    metrics: self.metrics.clone(),
                }))
            }
            Err(e) => {
                warn!("Failed to open translator {}: {}", pair, e);
                None
            }
        }
    }

    /// One marker batch, then per-fragment calls if the batch cannot be trusted.
    ///
    /// `None` entries are fragments the engine did not translate.
    async fn run_round(&self, handle: &dyn TranslatorHandle, texts: &[String]) -> Vec<Option<String>> {
        if texts.iter().any(|text| contains_marker(text)) {
            debug!("Fragment text contains a batch marker, translating sequentially");
            return join_all(texts.iter().map(|text| self.translate_one(handle, text))).await;
        }

        let start = Instant::now();
        let joined = join_with_markers(texts);

        let parsed = match self.call(handle, &joined).await {
            Ok(output) => {
                let parsed = split_markers(&output, texts.len());
                if parsed.is_none() {
                    debug!("Batch output lost markers, discarding");
                }
                parsed
            }
            Err(e) => {
                warn!("Batch translation failed: {}", e);
                None
            }
        };

        if let Some(ref m) = self.metrics {
            m.record_batch(parsed.is_some(), start.elapsed());
        }

        if let Some(segments) = parsed {
            return segments.into_iter().map(Some).collect();
        }

        info!("Falling back to {} sequential translations", texts.len());
        join_all(texts.iter().map(|text| self.translate_one(handle, text))).await
    }

    async fn translate_one(&self, handle: &dyn TranslatorHandle, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }

        let result = self.call(handle, text).await;
        if let Some(ref m) = self.metrics {
            m.record_sequential_call(result.is_ok());
        }

        match result {
            Ok(translated) => Some(translated),
            Err(e) => {
                warn!("Fragment translation failed, keeping original: {}", e);
                None
            }
        }
    }

    async fn call(&self, handle: &dyn TranslatorHandle, text: &str) -> EngineResult<String> {
        match tokio::time::timeout(self.engine_timeout, handle.translate(text)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.engine_timeout)),
        }
    }

    async fn open(&self, pair: LanguagePair) -> EngineResult<Arc<dyn TranslatorHandle>> {
        match tokio::time::timeout(self.engine_timeout, self.engine.open(pair)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.engine_timeout)),
        }
    }

    /// Whether the translation model for `lang` is available; errors read as false
    pub async fn is_model_downloaded(&self, lang: LanguageCode) -> bool {
        match self.model_manager.is_downloaded(lang).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                warn!("Model availability check for {} failed: {}", lang, e);
                false
            }
        }
    }

    /// Fetch the model for `lang` over unmetered networks only
    pub async fn download_model(&self, lang: LanguageCode) -> bool {
        match self.model_manager.download(lang, NetworkPolicy::UnmeteredOnly).await {
            Ok(()) => {
                info!("Model for {} downloaded", lang);
                true
            }
            Err(e) => {
                warn!("Model download for {} failed: {}", lang, e);
                false
            }
        }
    }

    /// Close the primary translator and persist the cache. Idempotent.
    pub async fn shutdown(&self) {
        let primary = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.generation += 1;
            state.primary.take()
        };

        if let Some(primary) = primary {
            primary.close();
            info!("Closed primary translator {}", primary.pair());
        }

        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.save().await {
                warn!("Failed to persist translation cache: {:#}", e);
            }
        }
    }
}

fn fill(results: Vec<Option<String>>, originals: Vec<String>) -> Vec<String> {
    results
        .into_iter()
        .zip(originals)
        .map(|(result, original)| result.unwrap_or(original))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{block, MockModelManager, MockTranslationEngine};
    use futures::FutureExt;
    use LanguageCode::*;

    fn dictionary(text: &str) -> EngineResult<String> {
        Ok(text.replace("Hello", "Hola").replace("World", "Mundo"))
    }

    fn blocks(texts: &[&str]) -> Vec<RecognizedBlock> {
        texts.iter().map(|t| block(t)).collect()
    }

    fn orchestrator(engine: Arc<MockTranslationEngine>) -> TranslationOrchestrator {
        TranslationOrchestrator::new(
            engine,
            Arc::new(MockModelManager::new(&[En, Es], false)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_batch_round_trip() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, Es).await;

        let result = orchestrator.translate(&blocks(&["Hello", "World"]), En, Es).await;

        assert_eq!(result, vec!["Hola", "Mundo"]);
        assert_eq!(engine.requests(), vec!["[#0#] Hello\n[#1#] World"]);
    }

    #[tokio::test]
    async fn test_missing_marker_falls_back_to_sequential() {
        let engine = Arc::new(MockTranslationEngine::new(|text: &str| {
            if text.contains("[#") {
                Ok("[#0#] Hola Mundo".to_string())
            } else {
                dictionary(text)
            }
        }));
        let metrics = Metrics::new();
        let orchestrator = orchestrator(engine.clone()).with_metrics(metrics.clone());
        orchestrator.update_languages(En, Es).await;

        let result = orchestrator.translate(&blocks(&["Hello", "World"]), En, Es).await;

        assert_eq!(result, vec!["Hola", "Mundo"]);
        let requests = engine.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.contains(&"Hello".to_string()));
        assert!(requests.contains(&"World".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_fallback, 1);
        assert_eq!(snapshot.sequential_calls, 2);
    }

    #[tokio::test]
    async fn test_marker_in_fragment_skips_batch() {
        let engine = Arc::new(MockTranslationEngine::new(|text: &str| Ok(text.to_string())));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, Es).await;

        let result = orchestrator
            .translate(&blocks(&["see [#1#] note", "second"]), En, Es)
            .await;

        assert_eq!(result, vec!["see [#1#] note", "second"]);
        let mut requests = engine.requests();
        requests.sort();
        assert_eq!(requests, vec!["second", "see [#1#] note"]);
    }

    #[tokio::test]
    async fn test_sequential_failures_keep_original_text() {
        let engine = Arc::new(MockTranslationEngine::new(|text: &str| {
            if text.contains("[#") || text == "World" {
                Err(EngineError::Failed("engine busy".into()))
            } else {
                dictionary(text)
            }
        }));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, Es).await;

        let result = orchestrator
            .translate(&blocks(&["Hello", "World", "  \n "]), En, Es)
            .await;

        assert_eq!(result, vec!["Hola", "World", ""]);
        // Batch call plus one call per non-empty fragment
        assert_eq!(engine.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_identity_pair_makes_no_calls() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, En).await;

        let result = orchestrator.translate(&blocks(&["Hello\n  World"]), En, En).await;

        assert_eq!(result, vec!["Hello World"]);
        assert_eq!(engine.open_count(), 0);
        assert!(!orchestrator.has_primary());
    }

    #[tokio::test]
    async fn test_empty_input_and_auto_languages() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());

        assert!(orchestrator.translate(&[], En, Es).await.is_empty());
        assert_eq!(orchestrator.translate(&blocks(&["Hello"]), Auto, Es).await, vec!["Hello"]);
        assert_eq!(engine.open_count(), 0);
    }

    #[tokio::test]
    async fn test_cjk_fragments_lose_whitespace() {
        let engine = Arc::new(MockTranslationEngine::new(|text: &str| Ok(text.to_string())));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(Ja, Es).await;

        let result = orchestrator.translate(&blocks(&["こんにちは\n世界"]), Ja, Es).await;

        assert_eq!(result, vec!["こんにちは世界"]);
        assert_eq!(engine.requests(), vec!["[#0#] こんにちは世界"]);
    }

    #[tokio::test]
    async fn test_temporary_translators_are_closed_per_request() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let metrics = Metrics::new();
        let orchestrator = orchestrator(engine.clone()).with_metrics(metrics.clone());
        orchestrator.update_languages(Auto, Es).await;
        assert_eq!(engine.open_count(), 0);

        orchestrator.translate(&blocks(&["Hello"]), En, Es).await;
        orchestrator.translate(&blocks(&["World"]), En, Es).await;

        let handles = engine.handles();
        assert_eq!(handles.len(), 2);
        assert!(handles.iter().all(|h| h.close_count() == 1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.temporary_translators_opened, 2);
        assert_eq!(snapshot.temporary_translators_closed, 2);
    }

    #[tokio::test]
    async fn test_primary_survives_until_pair_changes() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, Es).await;

        orchestrator.translate(&blocks(&["Hello"]), En, Es).await;
        orchestrator.translate(&blocks(&["World"]), En, Es).await;

        let primary = engine.handles()[0].clone();
        assert_eq!(engine.open_count(), 1);
        assert!(!primary.is_closed());

        orchestrator.update_languages(Fr, Es).await;

        assert_eq!(primary.close_count(), 1);
        assert_eq!(engine.open_count(), 2);
        assert_eq!(orchestrator.languages(), (Fr, Es));
    }

    #[tokio::test]
    async fn test_temporary_closed_when_request_is_cancelled() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(Auto, Es).await;

        // The mock translator yields once, so a single poll leaves the round in flight
        let input = blocks(&["Hello"]);
        assert!(orchestrator.translate(&input, En, Es).now_or_never().is_none());

        let handles = engine.handles();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_returns_untranslated_text() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        engine.set_fail_open(true);
        let orchestrator = orchestrator(engine.clone());

        orchestrator.update_languages(En, Es).await;
        assert!(!orchestrator.has_primary());
        assert_eq!(orchestrator.translate(&blocks(&["Hello "]), En, Es).await, vec!["Hello"]);

        orchestrator.update_languages(Auto, Es).await;
        assert_eq!(orchestrator.translate(&blocks(&["World"]), En, Es).await, vec!["World"]);
    }

    #[tokio::test]
    async fn test_superseded_open_is_closed() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary).with_open_delay(Duration::from_millis(30)));
        let orchestrator = orchestrator(engine.clone());

        tokio::join!(
            orchestrator.update_languages(En, Es),
            orchestrator.update_languages(Fr, Es),
        );

        let handles = engine.handles();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            let stale = handle.pair() == LanguagePair::new(En, Es);
            assert_eq!(handle.is_closed(), stale);
        }
        assert_eq!(orchestrator.languages(), (Fr, Es));
        assert!(orchestrator.has_primary());
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranslationCache::new(dir.path(), 100, None, None).await.unwrap();
        let engine = Arc::new(MockTranslationEngine::new(|text: &str| {
            if text.contains("Bye") {
                Err(EngineError::Failed("no".into()))
            } else {
                dictionary(text)
            }
        }));
        let orchestrator = orchestrator(engine.clone()).with_cache(cache.clone());
        orchestrator.update_languages(En, Es).await;

        assert_eq!(orchestrator.translate(&blocks(&["Hello"]), En, Es).await, vec!["Hola"]);
        assert_eq!(orchestrator.translate(&blocks(&["Hello"]), En, Es).await, vec!["Hola"]);
        assert_eq!(engine.requests().len(), 1);

        // Only the miss goes to the engine
        let result = orchestrator.translate(&blocks(&["Hello", "World"]), En, Es).await;
        assert_eq!(result, vec!["Hola", "Mundo"]);
        assert_eq!(engine.requests().last().map(String::as_str), Some("[#0#] World"));

        // Untranslated fallbacks are not cached
        orchestrator.translate(&blocks(&["Bye"]), En, Es).await;
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_primary_once() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let orchestrator = orchestrator(engine.clone());
        orchestrator.update_languages(En, Es).await;

        orchestrator.shutdown().await;
        orchestrator.shutdown().await;

        assert_eq!(engine.handles()[0].close_count(), 1);
        assert_eq!(orchestrator.translate(&blocks(&["Hello"]), En, Es).await, vec!["Hello"]);
        assert_eq!(engine.requests().len(), 0);
    }

    #[tokio::test]
    async fn test_model_management() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let manager = Arc::new(MockModelManager::new(&[En], false));
        let orchestrator = TranslationOrchestrator::new(engine, manager.clone(), Duration::from_secs(5));

        assert!(orchestrator.is_model_downloaded(En).await);
        assert!(!orchestrator.is_model_downloaded(Ja).await);
        assert!(orchestrator.download_model(Ja).await);
        assert!(orchestrator.is_model_downloaded(Ja).await);
        assert_eq!(*manager.policies.lock(), vec![NetworkPolicy::UnmeteredOnly]);
    }

    #[tokio::test]
    async fn test_download_refused_on_metered_network() {
        let engine = Arc::new(MockTranslationEngine::new(dictionary));
        let manager = Arc::new(MockModelManager::new(&[], true));
        let orchestrator = TranslationOrchestrator::new(engine, manager, Duration::from_secs(5));

        assert!(!orchestrator.download_model(Ko).await);
        assert!(!orchestrator.is_model_downloaded(Ko).await);
    }
}
