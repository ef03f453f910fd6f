#![allow(dead_code)]

// Shared test doubles for the media toolchain and speech model seams.
//
// FakeToolchain records every invocation and fabricates outputs on disk so
// flows that rename/delete artifacts behave like production. Probing parses
// a "duration=<secs>" marker out of the file body; files without the marker
// (e.g. raw appended chunk bytes) fail the probe, which exercises the
// tracked-duration fallback paths.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use streamscribe::media::{ChannelSelection, ExtractSpec, MediaToolchain};
use streamscribe::model::{ModelProvider, SpeechModel, TranscriptSegment};

#[derive(Debug, Clone)]
pub struct RecordedExtraction {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub start: f64,
    pub duration: Option<f64>,
    pub channel: ChannelSelection,
}

#[derive(Default)]
pub struct FakeToolchain {
    pub extractions: Mutex<Vec<RecordedExtraction>>,
    pub concat_calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub remux_calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub fail_extractions: AtomicBool,
    pub fail_remux: AtomicBool,
}

impl FakeToolchain {
    pub fn extraction_log(&self) -> Vec<RecordedExtraction> {
        self.extractions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaToolchain for FakeToolchain {
    async fn extract_audio(&self, src: &Path, dest: &Path, spec: &ExtractSpec) -> Result<()> {
        self.extractions.lock().unwrap().push(RecordedExtraction {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            start: spec.start,
            duration: spec.duration,
            channel: spec.channel,
        });

        if self.fail_extractions.load(Ordering::SeqCst) {
            return Err(anyhow!("extraction disabled for this test"));
        }

        std::fs::write(dest, b"fake wav")?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let body = std::fs::read_to_string(path)?;
        body.strip_prefix("duration=")
            .and_then(|value| value.trim().parse::<f64>().ok())
            .ok_or_else(|| anyhow!("no duration marker in {}", path.display()))
    }

    async fn concat_copy(&self, list_file: &Path, dest: &Path) -> Result<()> {
        self.concat_calls
            .lock()
            .unwrap()
            .push((list_file.to_path_buf(), dest.to_path_buf()));

        std::fs::write(dest, b"concat")?;
        Ok(())
    }

    async fn remux_seekable(&self, src: &Path, dest: &Path) -> Result<()> {
        self.remux_calls
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dest.to_path_buf()));

        if self.fail_remux.load(Ordering::SeqCst) {
            return Err(anyhow!("remux disabled for this test"));
        }

        std::fs::copy(src, dest)?;
        Ok(())
    }
}

/// Scripted model: returns queued segment batches in order, then empty
/// batches once the script is exhausted. Note the set_model verification
/// pass consumes the first queued response.
pub struct FakeModel {
    responses: Mutex<VecDeque<Vec<TranscriptSegment>>>,
    pub calls: Mutex<Vec<PathBuf>>,
    fail: AtomicBool,
}

impl FakeModel {
    pub fn scripted(responses: Vec<Vec<TranscriptSegment>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn failing() -> Arc<Self> {
        let model = Self::scripted(Vec::new());
        model.fail.store(true, Ordering::SeqCst);
        model
    }
}

#[async_trait]
impl SpeechModel for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        _channel: ChannelSelection,
        _language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        self.calls.lock().unwrap().push(audio_path.to_path_buf());

        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("model refused to load"));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

pub struct FakeModelProvider {
    pub model: Arc<FakeModel>,
}

impl ModelProvider for FakeModelProvider {
    fn create(&self, _model_name: &str) -> Arc<dyn SpeechModel> {
        Arc::clone(&self.model) as Arc<dyn SpeechModel>
    }
}

/// Convenience constructor for scripted segments
pub fn segment(text: &str, start: f64, end: f64) -> TranscriptSegment {
    TranscriptSegment {
        text: text.to_string(),
        start,
        end,
    }
}
