// Scripted engine doubles for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, LanguagePair, NetworkPolicy, PageImage, RecognizedBlock, Rect};
use crate::services::engines::{
    LanguageIdentifier, ModelManager, RecognitionEngine, TranslationEngine, TranslatorHandle,
};

pub fn block(text: &str) -> RecognizedBlock {
    RecognizedBlock::new(text, Rect::new(0, 0, 100, 20))
}

pub fn blank_page() -> PageImage {
    PageImage {
        bytes: Arc::new(vec![0u8; 16]),
        width: 4,
        height: 4,
    }
}

pub struct ScriptedRecognizer {
    response: Result<Vec<RecognizedBlock>, String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn returning(texts: &[&str]) -> Self {
        Self::with_response(Ok(texts.iter().map(|t| block(t)).collect()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_response(Err(message.to_string()))
    }

    fn with_response(response: Result<Vec<RecognizedBlock>, String>) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedRecognizer {
    async fn process(&self, _image: &PageImage) -> EngineResult<Vec<RecognizedBlock>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(EngineError::Failed)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedIdentifier {
    response: Result<String, String>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedIdentifier {
    pub fn returning(code: &str) -> Self {
        Self {
            response: Ok(code.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageIdentifier for ScriptedIdentifier {
    async fn identify(&self, _text: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.clone().map_err(EngineError::Failed)
    }
}

type Responder = Arc<dyn Fn(&str) -> EngineResult<String> + Send + Sync>;

/// Translation engine whose translators answer through one shared closure
pub struct MockTranslationEngine {
    responder: Responder,
    open_delay: Duration,
    fail_open: AtomicBool,
    opened: Mutex<Vec<Arc<MockTranslator>>>,
}

impl MockTranslationEngine {
    pub fn new(responder: impl Fn(&str) -> EngineResult<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            open_delay: Duration::ZERO,
            fail_open: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Every translator opened so far, in open order
    pub fn handles(&self) -> Vec<Arc<MockTranslator>> {
        self.opened.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// All translate requests across every translator
    pub fn requests(&self) -> Vec<String> {
        self.opened
            .lock()
            .iter()
            .flat_map(|h| h.requests())
            .collect()
    }
}

#[async_trait]
impl TranslationEngine for MockTranslationEngine {
    async fn open(&self, pair: LanguagePair) -> EngineResult<Arc<dyn TranslatorHandle>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable(format!("no model for {}", pair)));
        }

        let handle = Arc::new(MockTranslator {
            pair,
            responder: Arc::clone(&self.responder),
            requests: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.opened.lock().push(Arc::clone(&handle));
        Ok(handle)
    }
}

pub struct MockTranslator {
    pair: LanguagePair,
    responder: Responder,
    requests: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl MockTranslator {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

#[async_trait]
impl TranslatorHandle for MockTranslator {
    fn pair(&self) -> LanguagePair {
        self.pair
    }

    async fn translate(&self, text: &str) -> EngineResult<String> {
        if self.is_closed() {
            return Err(EngineError::Closed(self.pair));
        }
        self.requests.lock().push(text.to_string());
        tokio::task::yield_now().await;
        (self.responder)(text)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockModelManager {
    downloaded: Mutex<HashSet<LanguageCode>>,
    metered: bool,
    pub policies: Mutex<Vec<NetworkPolicy>>,
}

impl MockModelManager {
    pub fn new(downloaded: &[LanguageCode], metered: bool) -> Self {
        Self {
            downloaded: Mutex::new(downloaded.iter().copied().collect()),
            metered,
            policies: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelManager for MockModelManager {
    async fn is_downloaded(&self, lang: LanguageCode) -> EngineResult<bool> {
        Ok(self.downloaded.lock().contains(&lang))
    }

    async fn download(&self, lang: LanguageCode, policy: NetworkPolicy) -> EngineResult<()> {
        self.policies.lock().push(policy);
        if self.metered && policy == NetworkPolicy::UnmeteredOnly {
            return Err(EngineError::NetworkPolicy(policy));
        }
        self.downloaded.lock().insert(lang);
        Ok(())
    }
}
