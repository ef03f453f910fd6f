use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::library::{RecordingLibrary, ResumeContext, AUDIO_URL_PREFIX};
use super::messages::{ClientMessage, ServerMessage};
use crate::align::align_overlap;
use crate::audio::{wav, AudioAccumulator, WINDOW_SECS};
use crate::media::{ChannelSelection, MediaToolchain};
use crate::model::{canonical_model_size, display_name, ModelProvider, SpeechModel, TranscriptSegment};

/// Tokens of new-text prefix searched for overlap with the previous pass
const OVERLAP_SEARCH_TOKENS: usize = 15;

/// Cadence of model-loading progress events
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Length of the silent clip used to verify a freshly selected model
const VERIFY_CLIP_SECS: f64 = 1.0;

/// Punctuation stripped from a pass's tail before alignment; the next pass
/// usually restates the same words without it
const SENTENCE_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '-'];

/// Collaborators shared by all sessions, injected from the application state
#[derive(Clone)]
pub struct SessionContext {
    pub audio_dir: PathBuf,
    pub sample_rate: u32,
    pub toolchain: Arc<dyn MediaToolchain>,
    pub models: Arc<dyn ModelProvider>,
    /// Bounds transcription passes in flight across all sessions
    pub passes: Arc<Semaphore>,
}

/// Whether a transcription pass serves the live stream or finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Streaming,
    Final,
}

/// Per-connection protocol state machine.
///
/// One instance per WebSocket connection, fed decoded messages strictly in
/// arrival order. Events go out through an mpsc sender; a failed send means
/// the peer is gone and is logged, never escalated. A connection handles
/// multiple consecutive recordings: after each `end_recording` the session
/// rotates to a fresh id and accumulator while model, channel, and language
/// selections persist.
pub struct TranscribeSession {
    ctx: SessionContext,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    session_id: String,
    model: Option<Arc<dyn SpeechModel>>,
    channel: ChannelSelection,
    language: Option<String>,
    resume: Option<ResumeContext>,
    library: RecordingLibrary,
    accumulator: AudioAccumulator,
    chunk_counter: u64,
    recording_started: DateTime<Utc>,
}

impl TranscribeSession {
    pub fn new(ctx: SessionContext, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let accumulator = AudioAccumulator::new(
            ctx.audio_dir.clone(),
            session_id.clone(),
            ctx.sample_rate,
            Arc::clone(&ctx.toolchain),
        );
        let library = RecordingLibrary::new(ctx.audio_dir.clone(), Arc::clone(&ctx.toolchain));

        info!("Session {} created", session_id);

        Self {
            ctx,
            outbound,
            session_id,
            model: None,
            channel: ChannelSelection::Both,
            language: None,
            resume: None,
            library,
            accumulator,
            chunk_counter: 0,
            recording_started: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Greeting sent right after the connection is established
    pub fn announce_connected(&self) {
        self.send(ServerMessage::Status {
            message: "Connected. Ready to receive audio.".to_string(),
            session_id: Some(self.session_id.clone()),
            audio_url: None,
            duration_seconds: None,
        });
    }

    /// Decode and dispatch one raw text frame.
    ///
    /// A frame that is not JSON at all is a protocol error (`Err`): message
    /// boundaries can no longer be trusted and the connection loop must end.
    /// A JSON object with an unknown or malformed `type` is recoverable and
    /// reported as an `error` event.
    pub async fn handle_frame(&mut self, text: &str) -> Result<()> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("Malformed inbound message")?;

        match serde_json::from_value::<ClientMessage>(value.clone()) {
            Ok(message) => self.handle(message).await,
            Err(_) => {
                let message_type = value
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown");
                warn!("Unknown message type: {}", message_type);
                self.send_error(format!("Unknown message type: {}", message_type));
            }
        }

        Ok(())
    }

    /// Dispatch one inbound message; processed strictly in arrival order
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::SetModel { model } => self.handle_set_model(model).await,
            ClientMessage::SetChannel { channel } => self.handle_set_channel(&channel),
            ClientMessage::SetLanguage { language } => self.handle_set_language(language),
            ClientMessage::SetResumeTranscription { transcription_id } => {
                self.handle_resume_transcription(transcription_id).await
            }
            ClientMessage::SetResumeAudio { audio_path } => self.handle_resume_audio(audio_path),
            ClientMessage::AudioChunk { data, duration } => {
                self.handle_audio_chunk(&data, duration).await
            }
            ClientMessage::EndRecording => self.handle_end_recording().await,
            ClientMessage::Ping => self.send(ServerMessage::Pong),
        }
    }

    // ========================================================================
    // Configuration messages
    // ========================================================================

    async fn handle_set_model(&mut self, model_name: String) {
        info!("Client selected model: {}", model_name);

        let model = self.ctx.models.create(&model_name);
        let display = display_name(canonical_model_size(&model_name));
        self.send_status(format!("Loading {} model...", display));

        let progress = self.spawn_progress_ticker();
        let verified = self.verify_model(model.as_ref()).await;
        progress.abort();

        match verified {
            Ok(()) => {
                info!(
                    "Model {} verified successfully via test transcription",
                    model.name()
                );
                self.model = Some(model);
                self.send(ServerMessage::ModelReady {
                    message: format!("{} model loaded", display),
                });
                self.send_status("Ready to record");
            }
            Err(e) => {
                error!("Error loading model {}: {:#}", model_name, e);
                self.model = None;
                self.send_error(format!("Failed to load model: {}", e));
            }
        }
    }

    /// Emits periodic progress while a model load/verification is in flight;
    /// model loads can take seconds to minutes
    fn spawn_progress_ticker(&self) -> JoinHandle<()> {
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::time::sleep(PROGRESS_INTERVAL).await;
                let elapsed = started.elapsed().as_secs();
                let event = ServerMessage::DownloadProgress {
                    message: format!("Loading model... ({}s elapsed)", elapsed),
                    elapsed_seconds: elapsed,
                };
                if outbound.send(event).is_err() {
                    break;
                }
            }
        })
    }

    /// Run a trivial silent clip through the model so configuration errors
    /// surface now instead of on the first real chunk
    async fn verify_model(&self, model: &dyn SpeechModel) -> Result<()> {
        let clip = self
            .ctx
            .audio_dir
            .join(format!("{}_verify.wav", self.session_id));
        wav::write_silence(&clip, VERIFY_CLIP_SECS, self.ctx.sample_rate)?;

        let result = model
            .transcribe(&clip, self.channel, self.language.as_deref())
            .await;

        if let Err(e) = tokio::fs::remove_file(&clip).await {
            debug!("Could not remove verification clip: {}", e);
        }

        result.map(|_| ())
    }

    fn handle_set_channel(&mut self, channel: &str) {
        self.channel = ChannelSelection::parse_lenient(channel);
        info!("Client selected channel: {}", self.channel);
        self.send_status(format!("Channel set to: {}", self.channel));
    }

    fn handle_set_language(&mut self, language: Option<String>) {
        info!(
            "Client selected language: {}",
            language.as_deref().unwrap_or("auto-detect")
        );
        self.send_status(format!(
            "Language set to: {}",
            language.as_deref().unwrap_or("auto-detect")
        ));
        self.language = language;
    }

    // ========================================================================
    // Resume messages
    // ========================================================================

    async fn handle_resume_transcription(&mut self, transcription_id: Option<String>) {
        let Some(id) = transcription_id else {
            return;
        };

        info!("Client wants to resume transcription: {}", id);

        match self.library.find_by_id(&id).await {
            Some(resume) => {
                self.begin_resumed_recording(resume);
                self.send_status(format!("Resuming transcription: {}", id));
            }
            None => {
                warn!("Transcription {} not found", id);
                self.send_error(format!("Transcription not found: {}", id));
            }
        }
    }

    fn handle_resume_audio(&mut self, audio_path: Option<String>) {
        let Some(path) = audio_path else {
            return;
        };

        info!("set_resume_audio received: {}", path);

        let Some(filename) = path.strip_prefix(AUDIO_URL_PREFIX) else {
            warn!("Invalid audio path format: {}", path);
            self.send_error("Invalid audio path format");
            return;
        };

        match self.library.find_by_served_name(filename) {
            Some(resume) => {
                info!("Resuming from audio file: {}", resume.audio_path.display());
                self.begin_resumed_recording(resume);
                self.send_status("Resuming from previous recording");
            }
            None => {
                warn!("Audio file not found: {}", path);
                self.send_error(format!("Audio file not found: {}", path));
            }
        }
    }

    /// Rotate to a fresh session id and accumulator, recording the prior
    /// artifact that new audio will be appended to at finalization
    fn begin_resumed_recording(&mut self, resume: ResumeContext) {
        self.resume = Some(resume);
        self.rotate_session();
        info!("Created new session {} for resumed recording", self.session_id);
    }

    fn rotate_session(&mut self) {
        self.session_id = uuid::Uuid::new_v4().to_string();
        self.accumulator = AudioAccumulator::new(
            self.ctx.audio_dir.clone(),
            self.session_id.clone(),
            self.ctx.sample_rate,
            Arc::clone(&self.ctx.toolchain),
        );
        self.chunk_counter = 0;
        self.recording_started = Utc::now();
    }

    // ========================================================================
    // Audio streaming
    // ========================================================================

    async fn handle_audio_chunk(&mut self, data: &str, duration: f64) {
        if self.model.is_none() {
            self.send_error("No model selected. Please reconnect.");
            return;
        }

        let bytes = match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Error decoding audio chunk: {}", e);
                self.send_error(format!("Error processing audio: {}", e));
                return;
            }
        };

        debug!("Received audio chunk: {} bytes, {}s", bytes.len(), duration);

        if let Err(e) = self.accumulator.add_chunk(&bytes, duration).await {
            error!("Error processing audio chunk: {:#}", e);
            self.send_error(format!("Error processing audio: {}", e));
            return;
        }

        // require a full window in addition to the trigger threshold so the
        // first few seconds do not produce a spurious near-duplicate pass
        if self.accumulator.should_trigger().await
            && self.accumulator.absolute_duration().await >= WINDOW_SECS
        {
            self.send_status("Transcribing...");
            self.run_pass(PassKind::Streaming).await;
        }
    }

    /// One transcription pass: extract, transcribe, deduplicate, emit, mark.
    /// Extraction failure is a soft skip for streaming; finalization still
    /// emits an empty final event so the client can detect completion.
    async fn run_pass(&mut self, kind: PassKind) {
        let extracted = match kind {
            PassKind::Streaming => {
                let path = self
                    .accumulator
                    .extract_window(self.channel, self.chunk_counter)
                    .await;
                self.chunk_counter += 1;
                path
            }
            PassKind::Final => self.accumulator.extract_remainder(self.channel).await,
        };

        let Some(audio_path) = extracted else {
            if kind == PassKind::Final {
                self.send(ServerMessage::Transcription {
                    segments: Vec::new(),
                    streaming: false,
                    final_pass: true,
                    text: String::new(),
                });
            }
            return;
        };

        if let Err(e) = self.transcribe_extracted(&audio_path, kind).await {
            error!("Transcription error: {:#}", e);
            self.send_error(format!("Transcription failed: {}", e));
        }

        // cleanup runs whether or not the pass succeeded
        match tokio::fs::remove_file(&audio_path).await {
            Ok(()) => debug!("Deleted temporary extraction file: {}", audio_path.display()),
            Err(e) => warn!(
                "Could not delete temporary extraction {}: {}",
                audio_path.display(),
                e
            ),
        }
    }

    async fn transcribe_extracted(&mut self, audio_path: &Path, kind: PassKind) -> Result<()> {
        let model = self.model.clone().context("No model configured")?;

        let segments = {
            let _permit = self
                .ctx
                .passes
                .acquire()
                .await
                .context("Transcription worker pool closed")?;
            model
                .transcribe(audio_path, self.channel, self.language.as_deref())
                .await?
        };

        let full_text = join_segment_text(&segments);
        let alignment_input = full_text.trim_end_matches(SENTENCE_PUNCTUATION);

        let snapshot = self.accumulator.snapshot().await;
        let novel = align_overlap(
            &snapshot.last_emitted_text,
            alignment_input,
            OVERLAP_SEARCH_TOKENS,
        );

        if !novel.trim().is_empty() {
            let text = trim_dangling_punctuation(novel.trim());

            let mut out_segments = filter_emitted_segments(&segments, &text);
            if out_segments.is_empty() {
                // the alignment cut did not line up with segment boundaries;
                // emit one synthetic segment spanning the new audio
                out_segments = vec![TranscriptSegment {
                    text: text.clone(),
                    start: (snapshot.absolute_duration - snapshot.since_trigger).max(0.0),
                    end: snapshot.absolute_duration,
                }];
            }

            info!(
                "Sending {} transcription: {} segments",
                if kind == PassKind::Final { "final" } else { "streaming" },
                out_segments.len()
            );
            self.send(ServerMessage::Transcription {
                segments: out_segments,
                streaming: kind == PassKind::Streaming,
                final_pass: kind == PassKind::Final,
                text,
            });
        } else if kind == PassKind::Final {
            info!("No new text in final transcription");
            self.send(ServerMessage::Transcription {
                segments: Vec::new(),
                streaming: false,
                final_pass: true,
                text: String::new(),
            });
        } else {
            info!("No new text after deduplication, skipping send");
        }

        // marked even when nothing novel came out, so the same span is not
        // re-analyzed against the same anchor on the next trigger
        self.accumulator.mark_transcribed(full_text).await;

        Ok(())
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    async fn handle_end_recording(&mut self) {
        if self.model.is_none() {
            self.send_error("No model selected. Please reconnect.");
            return;
        }

        info!("End recording signal received");

        let container = self.accumulator.container_path().to_path_buf();

        if container.exists() {
            self.send(ServerMessage::ProcessingAudio {
                message: "Optimizing audio for playback...".to_string(),
            });

            if self.resume.is_none() {
                if let Err(e) = self.accumulator.repair_container().await {
                    error!("Failed to repair container metadata: {:#}", e);
                }
            } else {
                info!("Skipping metadata repair for intermediate container (will be concatenated)");
            }

            self.send_status("Processing final audio...");
            self.run_pass(PassKind::Final).await;
        }

        let mut final_path = container.clone();
        let mut total_duration = self.accumulator.absolute_duration().await;

        if let Some(resume) = self.resume.clone() {
            if resume.audio_path.exists() {
                info!("Concatenating audio files");
                self.send_status("Appending audio to existing recording...");

                match self.concatenate_with_prior(&resume, &container).await {
                    Ok((path, duration)) => {
                        final_path = path;
                        total_duration = duration;
                        self.send_status(format!(
                            "Audio appended successfully ({:.1}s total)",
                            total_duration
                        ));
                    }
                    Err(e) => {
                        // the session's own container remains a valid artifact
                        error!("Error concatenating audio: {:#}", e);
                        self.send_error("Failed to append audio files");
                    }
                }
            } else {
                warn!(
                    "Existing audio file not found: {}",
                    resume.audio_path.display()
                );
            }
        }

        let mut audio_url = None;
        if final_path.exists() {
            audio_url = final_path
                .file_name()
                .map(|name| format!("{}{}", AUDIO_URL_PREFIX, name.to_string_lossy()));

            match self.ctx.toolchain.probe_duration(&final_path).await {
                Ok(actual) => {
                    info!("Accurate final duration from probe: {:.2}s", actual);
                    total_duration = actual;
                }
                Err(e) => warn!("Could not probe final duration: {:#}", e),
            }
        }

        let elapsed = Utc::now().signed_duration_since(self.recording_started);
        info!(
            "Recording completed after {:.1}s wall time, artifact: {:?}",
            elapsed.num_milliseconds() as f64 / 1000.0,
            audio_url
        );

        self.send(ServerMessage::Status {
            message: "Recording completed. Transcription finished.".to_string(),
            session_id: None,
            audio_url,
            duration_seconds: Some(total_duration),
        });

        self.resume = None;
        self.rotate_session();
        info!("Reset for next recording, new session: {}", self.session_id);
    }

    /// Append this session's container onto the resumed prior recording via
    /// stream-copy concatenation, then take over the prior file's identity.
    /// Returns the final artifact path and the summed duration.
    async fn concatenate_with_prior(
        &self,
        resume: &ResumeContext,
        container: &Path,
    ) -> Result<(PathBuf, f64)> {
        let mut prior_duration = resume.known_duration;
        if prior_duration == 0.0 {
            match self.ctx.toolchain.probe_duration(&resume.audio_path).await {
                Ok(duration) => {
                    info!("Detected existing audio duration: {:.1}s", duration);
                    prior_duration = duration;
                }
                Err(e) => warn!("Could not detect existing audio duration: {:#}", e),
            }
        }

        let concat_output = self
            .ctx
            .audio_dir
            .join(format!("{}_concatenated.webm", self.session_id));
        let list_path = self
            .ctx
            .audio_dir
            .join(format!("{}_filelist.txt", self.session_id));

        let list = format!(
            "file '{}'\nfile '{}'\n",
            escape_concat_path(&resume.audio_path),
            escape_concat_path(container)
        );
        tokio::fs::write(&list_path, list)
            .await
            .context("Failed to write concat list")?;

        let concat_result = self
            .ctx
            .toolchain
            .concat_copy(&list_path, &concat_output)
            .await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            debug!("Could not remove concat list: {}", e);
        }

        concat_result.context("Stream-copy concatenation failed")?;

        if let Err(e) = tokio::fs::remove_file(container).await {
            warn!("Could not remove session container after concat: {}", e);
        }

        let session_duration = self.accumulator.absolute_duration().await;
        let total = prior_duration + session_duration;
        info!("Audio concatenation successful: {:.1}s total duration", total);

        // make the combined artifact seekable before it takes over the prior
        // file's identity
        let fixed = self
            .ctx
            .audio_dir
            .join(format!("{}_concatenated_fixed.webm", self.session_id));
        match self
            .ctx
            .toolchain
            .remux_seekable(&concat_output, &fixed)
            .await
        {
            Ok(()) => {
                tokio::fs::rename(&fixed, &concat_output)
                    .await
                    .context("Failed to replace concatenated file with repaired copy")?;
            }
            Err(e) => {
                warn!("Could not add seek metadata to concatenated file: {:#}", e);
                if let Err(remove_err) = tokio::fs::remove_file(&fixed).await {
                    debug!("Could not remove remux temp file: {}", remove_err);
                }
            }
        }

        match tokio::fs::rename(&concat_output, &resume.audio_path).await {
            Ok(()) => {
                info!(
                    "Renamed concatenated file to original: {}",
                    resume.audio_path.display()
                );
                Ok((resume.audio_path.clone(), total))
            }
            Err(e) => {
                warn!("Could not rename concatenated file: {}", e);
                Ok((concat_output, total))
            }
        }
    }

    // ========================================================================
    // Event plumbing
    // ========================================================================

    /// Failure to deliver an event means the peer is gone; log and move on
    fn send(&self, event: ServerMessage) {
        if self.outbound.send(event).is_err() {
            debug!("Could not deliver event, client disconnected");
        }
    }

    fn send_status(&self, message: impl Into<String>) {
        self.send(ServerMessage::status(message));
    }

    fn send_error(&self, message: impl Into<String>) {
        self.send(ServerMessage::error(message));
    }
}

/// Stripped, space-joined segment text
fn join_segment_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|seg| seg.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop a single dangling punctuation mark left behind by an alignment cut
fn trim_dangling_punctuation(text: &str) -> String {
    let mut cleaned = text.to_string();
    if let Some(last) = cleaned.chars().last() {
        if !last.is_alphanumeric() && !last.is_whitespace() {
            cleaned.pop();
        }
    }
    cleaned
}

/// Keep the model's own segments whose cleaned text survived deduplication,
/// preserving their original timestamps
fn filter_emitted_segments(
    segments: &[TranscriptSegment],
    novel_text: &str,
) -> Vec<TranscriptSegment> {
    segments
        .iter()
        .filter_map(|seg| {
            let text = trim_dangling_punctuation(seg.text.trim());
            if !text.is_empty() && novel_text.contains(&text) {
                Some(TranscriptSegment {
                    text,
                    start: seg.start,
                    end: seg.end,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Single quotes must be escaped in concat-demuxer list entries
fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}
