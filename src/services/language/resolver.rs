// Language resolver: heuristic first, identification service only when ambiguous

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::types::LanguageCode;
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::services::engines::LanguageIdentifier;
use crate::services::language::classifier::{classify, contains_latin};
use crate::utils::Metrics;

/// Resolves the source language of recognized text.
///
/// The identification service is reserved for Latin text the heuristic
/// could only call `en` by default, e.g. Spanish without accented letters.
/// Every failure mode resolves to the heuristic answer.
pub struct LanguageResolver {
    identifier: Arc<dyn LanguageIdentifier>,
    circuit_breaker: CircuitBreaker,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl LanguageResolver {
    pub fn new(
        identifier: Arc<dyn LanguageIdentifier>,
        timeout: Duration,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            identifier,
            circuit_breaker: circuit_breaker
                .unwrap_or_else(|| CircuitBreaker::new("language identification")),
            timeout,
            metrics,
        }
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn resolve(&self, text: &str) -> LanguageCode {
        let heuristic = classify(text);

        if heuristic != LanguageCode::En || !contains_latin(text) {
            debug!("Heuristic is conclusive: {}", heuristic);
            return heuristic;
        }

        if !self.circuit_breaker.allow_request() {
            debug!("Identification circuit open, keeping heuristic {}", heuristic);
            self.record(true);
            return heuristic;
        }

        let identified = match tokio::time::timeout(self.timeout, self.identifier.identify(text)).await {
            Ok(Ok(code)) => {
                self.circuit_breaker.record_success();
                Some(code)
            }
            Ok(Err(e)) => {
                self.circuit_breaker.record_failure();
                warn!("Language identification failed: {}", e);
                None
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                warn!("Language identification timed out after {:?}", self.timeout);
                None
            }
        };

        let resolved = identified.and_then(|code| determinate(&code));
        self.record(resolved.is_none());

        match resolved {
            Some(lang) => {
                debug!("Identification service resolved {}", lang);
                lang
            }
            None => heuristic,
        }
    }

    fn record(&self, fell_back: bool) {
        if let Some(ref m) = self.metrics {
            m.record_identification(fell_back);
        }
    }
}

/// A usable detection result, or None for `und`, `auto` and unsupported codes
fn determinate(code: &str) -> Option<LanguageCode> {
    match code.parse::<LanguageCode>() {
        Ok(LanguageCode::Undetermined) | Ok(LanguageCode::Auto) => None,
        Ok(lang) => Some(lang),
        Err(e) => {
            debug!("Ignoring identification result: {}", e);
            None
        }
    }
}
