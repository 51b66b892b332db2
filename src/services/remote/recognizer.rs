use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::errors::EngineResult;
use crate::core::types::{PageImage, RecognizedBlock, Rect, ScriptFamily};
use crate::services::engines::RecognitionEngine;
use crate::services::remote::http::HttpTransport;

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    blocks: Vec<SidecarBlock>,
}

#[derive(Debug, Deserialize)]
struct SidecarBlock {
    text: String,
    /// [x, y, width, height]
    bbox: [i32; 4],
}

impl From<SidecarBlock> for RecognizedBlock {
    fn from(block: SidecarBlock) -> Self {
        let [x, y, w, h] = block.bbox;
        RecognizedBlock::new(block.text, Rect::new(x, y, w.max(0) as u32, h.max(0) as u32))
    }
}

/// Recognition engine served by an OCR sidecar, one URL per script family
pub struct RemoteRecognizer {
    family: ScriptFamily,
    url: String,
    transport: HttpTransport,
}

impl RemoteRecognizer {
    pub fn new(family: ScriptFamily, url: impl Into<String>, transport: HttpTransport) -> Self {
        Self {
            family,
            url: url.into(),
            transport,
        }
    }
}

#[async_trait]
impl RecognitionEngine for RemoteRecognizer {
    #[instrument(skip(self, image), fields(family = %self.family, bytes = image.bytes.len()))]
    async fn process(&self, image: &PageImage) -> EngineResult<Vec<RecognizedBlock>> {
        let response: RecognitionResponse = self.transport.post_bytes(&self.url, &image.bytes).await?;
        debug!("{} sidecar returned {} blocks", self.family, response.blocks.len());
        Ok(response.blocks.into_iter().map(RecognizedBlock::from).collect())
    }

    fn close(&self) {
        debug!("Released {} recognizer at {}", self.family, self.url);
    }
}
