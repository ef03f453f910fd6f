//! Audio accumulation for in-progress recordings
//!
//! One `AudioAccumulator` per recording owns the append-only container file
//! and the windowing counters that decide when transcription passes fire.

mod accumulator;
pub mod wav;

pub use accumulator::{
    AccumulatorSnapshot, AudioAccumulator, OVERLAP_MARGIN_SECS, TRIGGER_THRESHOLD_SECS, WINDOW_SECS,
};
