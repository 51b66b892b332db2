// Recognition fan-out coordinator
//
// Runs the script-family recognizers selected for a source hint against the
// same page concurrently, drops noise-only outputs and keeps the single
// outcome with the most text.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::core::errors::EngineError;
use crate::core::types::{LanguageCode, PageImage, RecognitionOutcome, RecognizedBlock, ScriptFamily};
use crate::services::engines::RecognitionEngine;
use crate::services::language::is_cjk_char;
use crate::utils::Metrics;

struct RegisteredEngine {
    family: ScriptFamily,
    engine: Arc<dyn RecognitionEngine>,
}

pub struct RecognitionCoordinator {
    engines: Vec<RegisteredEngine>,
    engine_timeout: Duration,
    metrics: Option<Metrics>,
    closed: AtomicBool,
}

impl RecognitionCoordinator {
    /// Engines are kept in registration order, which also breaks arbitration ties
    pub fn new(
        engines: Vec<(ScriptFamily, Arc<dyn RecognitionEngine>)>,
        engine_timeout: Duration,
        metrics: Option<Metrics>,
    ) -> Self {
        let engines = engines
            .into_iter()
            .map(|(family, engine)| RegisteredEngine { family, engine })
            .collect();

        Self {
            engines,
            engine_timeout,
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    /// Recognize text on a page.
    ///
    /// Resolves only after every selected engine has settled. `None` means no
    /// engine produced usable text, which is a normal outcome.
    #[instrument(skip(self, image), fields(hint = %hint, width = image.width, height = image.height))]
    pub async fn recognize(&self, image: &PageImage, hint: LanguageCode) -> Option<Vec<RecognizedBlock>> {
        if self.closed.load(Ordering::Acquire) {
            warn!("Recognition requested after shutdown");
            return None;
        }

        let wanted = ScriptFamily::for_hint(hint);
        let selected: Vec<&RegisteredEngine> = self
            .engines
            .iter()
            .filter(|e| wanted.contains(&e.family))
            .collect();

        if selected.is_empty() {
            warn!("No recognition engine registered for hint {}", hint);
            self.record_recognition(false);
            return None;
        }

        debug!("Fanning out to {} engine(s)", selected.len());

        // Each branch settles to Some(outcome) or None; join_all preserves order
        let outcomes = join_all(selected.iter().map(|e| self.run_engine(e, image))).await;

        let best = arbitrate(outcomes.into_iter().flatten());
        self.record_recognition(best.is_some());

        match best {
            Some(outcome) => {
                info!(
                    "Selected {} engine ({} blocks, {} chars)",
                    outcome.engine,
                    outcome.blocks.len(),
                    outcome.char_count()
                );
                Some(outcome.blocks)
            }
            None => {
                info!("No usable text found");
                None
            }
        }
    }

    async fn run_engine(&self, registered: &RegisteredEngine, image: &PageImage) -> Option<RecognitionOutcome> {
        let family = registered.family;
        let start = Instant::now();

        let result = match tokio::time::timeout(self.engine_timeout, registered.engine.process(image)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.engine_timeout)),
        };

        if let Some(ref m) = self.metrics {
            m.record_engine_call(family.name(), result.is_ok());
        }

        match result {
            Ok(blocks) => {
                debug!(
                    "{} engine returned {} blocks in {:.1}ms",
                    family,
                    blocks.len(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                if has_meaningful_text(&blocks) {
                    Some(RecognitionOutcome { engine: family, blocks })
                } else {
                    debug!("{} engine output discarded as noise", family);
                    None
                }
            }
            Err(e) => {
                warn!("{} recognizer failed: {}", family, e);
                None
            }
        }
    }

    fn record_recognition(&self, found_text: bool) {
        if let Some(ref m) = self.metrics {
            m.record_recognition(found_text);
        }
    }

    /// Close every engine. Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for registered in &self.engines {
            registered.engine.close();
        }
        info!("Closed {} recognition engine(s)", self.engines.len());
    }
}

/// True if at least one block carries a letter, digit or CJK character
fn has_meaningful_text(blocks: &[RecognizedBlock]) -> bool {
    blocks.iter().any(|block| {
        block
            .text
            .trim()
            .chars()
            .any(|c| c.is_alphabetic() || c.is_numeric() || is_cjk_char(c))
    })
}

/// Longest concatenated text wins; the earliest outcome wins ties
fn arbitrate(outcomes: impl IntoIterator<Item = RecognitionOutcome>) -> Option<RecognitionOutcome> {
    outcomes.into_iter().fold(None, |best: Option<RecognitionOutcome>, candidate| match best {
        Some(current) if current.char_count() >= candidate.char_count() => Some(current),
        _ => Some(candidate),
    })
}
