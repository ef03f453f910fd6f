pub mod align;
pub mod audio;
pub mod config;
pub mod http;
pub mod media;
pub mod model;
pub mod session;

pub use align::align_overlap;
pub use audio::{AccumulatorSnapshot, AudioAccumulator};
pub use config::Config;
pub use http::{create_router, AppState};
pub use media::{ChannelSelection, ExtractSpec, FfmpegToolchain, MediaToolchain};
pub use model::{ModelCatalog, ModelProvider, SpeechModel, TranscriptSegment, WhisperCliModel};
pub use session::{
    ClientMessage, RecordingLibrary, ResumeContext, ServerMessage, SessionContext,
    TranscribeSession,
};
