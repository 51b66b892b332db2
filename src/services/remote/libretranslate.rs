use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, LanguagePair, NetworkPolicy};
use crate::services::engines::{LanguageIdentifier, ModelManager, TranslationEngine, TranslatorHandle};
use crate::services::remote::http::HttpTransport;

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct LanguageInfo {
    code: String,
    #[serde(default)]
    targets: Option<Vec<String>>,
}

struct LibreTranslateInner {
    base_url: String,
    api_key: Option<String>,
    transport: HttpTransport,
    metered: bool,
}

impl LibreTranslateInner {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn languages(&self) -> EngineResult<Vec<LanguageInfo>> {
        self.transport.get_json(&self.url("/languages")).await
    }
}

/// LibreTranslate-compatible server acting as identification service,
/// translation engine and model catalogue
#[derive(Clone)]
pub struct LibreTranslate {
    inner: Arc<LibreTranslateInner>,
}

impl LibreTranslate {
    pub fn new(base_url: &str, api_key: Option<String>, transport: HttpTransport, metered: bool) -> Self {
        Self {
            inner: Arc::new(LibreTranslateInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                transport,
                metered,
            }),
        }
    }
}

#[async_trait]
impl LanguageIdentifier for LibreTranslate {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn identify(&self, text: &str) -> EngineResult<String> {
        let request = DetectRequest {
            q: text,
            api_key: self.inner.api_key.as_deref(),
        };
        let detections: Vec<Detection> = self.inner.transport.post_json(&self.inner.url("/detect"), &request).await?;

        let best = detections
            .into_iter()
            .fold(None, |best: Option<Detection>, candidate| match best {
                Some(current) if current.confidence >= candidate.confidence => Some(current),
                _ => Some(candidate),
            });

        Ok(best
            .map(|d| d.language)
            .unwrap_or_else(|| LanguageCode::Undetermined.code().to_string()))
    }
}

#[async_trait]
impl TranslationEngine for LibreTranslate {
    async fn open(&self, pair: LanguagePair) -> EngineResult<Arc<dyn TranslatorHandle>> {
        let languages = self.inner.languages().await?;

        let source = languages
            .iter()
            .find(|l| l.code == pair.source.code())
            .ok_or_else(|| EngineError::Unavailable(format!("no model for {}", pair.source)))?;

        if let Some(ref targets) = source.targets {
            if !targets.iter().any(|t| t == pair.target.code()) {
                return Err(EngineError::Unavailable(format!("no model for {}", pair)));
            }
        }

        debug!("Opened LibreTranslate translator {}", pair);
        Ok(Arc::new(LibreTranslator {
            pair,
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl ModelManager for LibreTranslate {
    async fn is_downloaded(&self, lang: LanguageCode) -> EngineResult<bool> {
        let languages = self.inner.languages().await?;
        Ok(languages.iter().any(|l| l.code == lang.code()))
    }

    /// Models live on the server; a download succeeds when the server
    /// already serves the language and the network policy allows it
    async fn download(&self, lang: LanguageCode, policy: NetworkPolicy) -> EngineResult<()> {
        if policy == NetworkPolicy::UnmeteredOnly && self.inner.metered {
            return Err(EngineError::NetworkPolicy(policy));
        }

        if self.is_downloaded(lang).await? {
            Ok(())
        } else {
            Err(EngineError::Unavailable(format!("server has no model for {}", lang)))
        }
    }
}

struct LibreTranslator {
    pair: LanguagePair,
    inner: Arc<LibreTranslateInner>,
    closed: AtomicBool,
}

#[async_trait]
impl TranslatorHandle for LibreTranslator {
    fn pair(&self) -> LanguagePair {
        self.pair
    }

    async fn translate(&self, text: &str) -> EngineResult<String> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed(self.pair));
        }

        let request = TranslateRequest {
            q: text,
            source: self.pair.source.code(),
            target: self.pair.target.code(),
            format: "text",
            api_key: self.inner.api_key.as_deref(),
        };
        let response: TranslateResponse = self
            .inner
            .transport
            .post_json(&self.inner.url("/translate"), &request)
            .await?;

        Ok(response.translated_text)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::circuit_breaker::CircuitBreaker;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake_server() -> Router {
        Router::new()
            .route(
                "/detect",
                post(|Json(body): Json<Value>| async move {
                    let text = body["q"].as_str().unwrap_or_default().to_string();
                    if text.is_empty() {
                        return Json(json!([]));
                    }
                    Json(json!([
                        {"language": "en", "confidence": 20.0},
                        {"language": "es", "confidence": 85.0},
                        {"language": "pt", "confidence": 85.0}
                    ]))
                }),
            )
            .route(
                "/translate",
                post(|Json(body): Json<Value>| async move {
                    let q = body["q"].as_str().unwrap_or_default();
                    let target = body["target"].as_str().unwrap_or_default();
                    Json(json!({"translatedText": format!("{}:{}", target, q)}))
                }),
            )
            .route(
                "/languages",
                get(|| async {
                    Json(json!([
                        {"code": "en", "name": "English", "targets": ["es", "ja"]},
                        {"code": "es", "name": "Spanish", "targets": ["en"]},
                        {"code": "ja", "name": "Japanese"}
                    ]))
                }),
            )
    }

    async fn client(metered: bool) -> LibreTranslate {
        let base_url = serve(fake_server()).await;
        let transport = HttpTransport::new(Duration::from_secs(5), 0)
            .unwrap()
            .with_circuit_breaker(CircuitBreaker::new("libretranslate"));
        LibreTranslate::new(&format!("{}/", base_url), None, transport, metered)
    }

    #[tokio::test]
    async fn test_identify_picks_most_confident() {
        let libre = client(false).await;

        assert_eq!(libre.identify("hola amigo").await.unwrap(), "es");
        assert_eq!(libre.identify("").await.unwrap(), "und");
    }

    #[tokio::test]
    async fn test_translator_lifecycle() {
        let libre = client(false).await;
        let pair = LanguagePair::new(LanguageCode::En, LanguageCode::Es);

        let handle = libre.open(pair).await.unwrap();
        assert_eq!(handle.pair(), pair);
        assert_eq!(handle.translate("[#0#] Hello").await.unwrap(), "es:[#0#] Hello");

        handle.close();
        assert!(matches!(handle.translate("Hello").await, Err(EngineError::Closed(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_unserved_pairs() {
        let libre = client(false).await;

        let unknown_source = LanguagePair::new(LanguageCode::Ko, LanguageCode::En);
        let unknown_target = LanguagePair::new(LanguageCode::Es, LanguageCode::Ja);
        assert!(matches!(libre.open(unknown_source).await, Err(EngineError::Unavailable(_))));
        assert!(matches!(libre.open(unknown_target).await, Err(EngineError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_model_catalogue() {
        let libre = client(false).await;

        assert!(libre.is_downloaded(LanguageCode::Ja).await.unwrap());
        assert!(!libre.is_downloaded(LanguageCode::Ko).await.unwrap());
        assert!(libre.download(LanguageCode::Es, NetworkPolicy::UnmeteredOnly).await.is_ok());
        assert!(libre.download(LanguageCode::Ko, NetworkPolicy::Any).await.is_err());
    }

    #[tokio::test]
    async fn test_metered_network_blocks_unmetered_only_downloads() {
        let libre = client(true).await;

        assert!(matches!(
            libre.download(LanguageCode::Es, NetworkPolicy::UnmeteredOnly).await,
            Err(EngineError::NetworkPolicy(NetworkPolicy::UnmeteredOnly))
        ));
        assert!(libre.download(LanguageCode::Es, NetworkPolicy::Any).await.is_ok());
    }
}
