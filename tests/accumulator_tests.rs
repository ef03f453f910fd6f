// Integration tests for the audio accumulator.
//
// These verify the windowing counters that drive transcription triggers and
// the extraction requests handed to the media toolchain.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use common::FakeToolchain;
use streamscribe::media::ChannelSelection;
use streamscribe::AudioAccumulator;
use tempfile::TempDir;

fn accumulator(dir: &TempDir, toolchain: Arc<FakeToolchain>) -> AudioAccumulator {
    AudioAccumulator::new(
        dir.path().to_path_buf(),
        "test-session".to_string(),
        16000,
        toolchain,
    )
}

#[tokio::test]
async fn absolute_duration_is_the_sum_of_chunk_durations() -> Result<()> {
    let dir = TempDir::new()?;
    let acc = accumulator(&dir, Arc::new(FakeToolchain::default()));

    let mut previous = 0.0;
    for duration in [1.5, 2.0, 0.5] {
        acc.add_chunk(b"bytes", duration).await?;
        let current = acc.absolute_duration().await;
        assert!(current >= previous, "duration must be non-decreasing");
        previous = current;
    }

    assert!((acc.absolute_duration().await - 4.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn chunks_append_to_a_single_container_file() -> Result<()> {
    let dir = TempDir::new()?;
    let acc = accumulator(&dir, Arc::new(FakeToolchain::default()));

    acc.add_chunk(b"first", 1.0).await?;
    acc.add_chunk(b"second", 1.0).await?;

    let body = std::fs::read(acc.container_path())?;
    assert_eq!(body, b"firstsecond");
    Ok(())
}

#[tokio::test]
async fn trigger_rearms_only_after_threshold_of_new_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let acc = accumulator(&dir, Arc::new(FakeToolchain::default()));

    acc.add_chunk(b"a", 3.0).await?;
    assert!(!acc.should_trigger().await);
    acc.add_chunk(b"b", 3.0).await?;
    assert!(acc.should_trigger().await);

    acc.mark_transcribed("some text".to_string()).await;
    assert!(!acc.should_trigger().await, "trigger must re-arm after a pass");

    acc.add_chunk(b"c", 5.5).await?;
    assert!(!acc.should_trigger().await);
    acc.add_chunk(b"d", 0.5).await?;
    assert!(acc.should_trigger().await);

    Ok(())
}

#[tokio::test]
async fn window_extraction_never_exceeds_recorded_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let toolchain = Arc::new(FakeToolchain::default());
    let acc = accumulator(&dir, Arc::clone(&toolchain));

    // shorter than the window: the whole file is requested
    acc.add_chunk(b"short", 4.0).await?;
    let path = acc.extract_window(ChannelSelection::Both, 0).await;
    assert!(path.is_some());

    // much longer than the window: only the trailing window is requested
    acc.add_chunk(b"more", 16.0).await?;
    let path = acc.extract_window(ChannelSelection::Left, 1).await;
    assert!(path.is_some());

    let log = toolchain.extraction_log();
    for extraction in &log {
        assert!(extraction.start >= 0.0, "start time must never be negative");
        let duration = extraction.duration.expect("window extractions are bounded");
        assert!(
            extraction.start + duration <= 20.0 + 1e-9,
            "window must stay within recorded audio"
        );
        assert!(duration <= 9.0 + 1e-9);
    }

    let second = &log[1];
    assert!((second.start - 11.0).abs() < 1e-9);
    assert_eq!(second.channel, ChannelSelection::Left);

    Ok(())
}

#[tokio::test]
async fn window_extraction_failure_is_a_soft_none() -> Result<()> {
    let dir = TempDir::new()?;
    let toolchain = Arc::new(FakeToolchain::default());
    toolchain.fail_extractions.store(true, Ordering::SeqCst);
    let acc = accumulator(&dir, Arc::clone(&toolchain));

    acc.add_chunk(b"bytes", 10.0).await?;
    assert!(acc.extract_window(ChannelSelection::Both, 0).await.is_none());
    Ok(())
}

#[tokio::test]
async fn negligible_remainder_is_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let acc = accumulator(&dir, Arc::new(FakeToolchain::default()));

    // probe has no duration marker to parse, so the tracked 0.3s is used and
    // the remainder falls below the 0.5s floor
    acc.add_chunk(b"x", 0.3).await?;
    assert!(acc.extract_remainder(ChannelSelection::Both).await.is_none());
    Ok(())
}

#[tokio::test]
async fn remainder_re_covers_the_overlap_margin() -> Result<()> {
    let dir = TempDir::new()?;
    let toolchain = Arc::new(FakeToolchain::default());
    let acc = accumulator(&dir, Arc::clone(&toolchain));

    acc.add_chunk(b"bytes", 10.0).await?;
    acc.mark_transcribed("already transcribed".to_string()).await;

    let path = acc.extract_remainder(ChannelSelection::Both).await;
    assert!(path.is_some());

    let log = toolchain.extraction_log();
    // last transcribed position is 10 - 2 = 8; the remainder backs up a
    // further 2s margin and runs to end of file
    assert!((log[0].start - 6.0).abs() < 1e-9);
    assert!(log[0].duration.is_none());

    Ok(())
}

#[tokio::test]
async fn mark_transcribed_stores_the_alignment_anchor() -> Result<()> {
    let dir = TempDir::new()?;
    let acc = accumulator(&dir, Arc::new(FakeToolchain::default()));

    acc.add_chunk(b"bytes", 7.0).await?;
    acc.mark_transcribed("the full emitted text".to_string()).await;

    let snapshot = acc.snapshot().await;
    assert_eq!(snapshot.last_emitted_text, "the full emitted text");
    assert!((snapshot.last_transcribed_position - 5.0).abs() < 1e-9);
    assert_eq!(snapshot.since_trigger, 0.0);

    Ok(())
}

#[tokio::test]
async fn repair_replaces_container_only_on_success() -> Result<()> {
    let dir = TempDir::new()?;
    let toolchain = Arc::new(FakeToolchain::default());
    let acc = accumulator(&dir, Arc::clone(&toolchain));

    acc.add_chunk(b"original-bytes", 2.0).await?;
    acc.repair_container().await?;
    assert!(acc.container_path().exists());
    assert_eq!(toolchain.remux_calls.lock().unwrap().len(), 1);

    // failed remux leaves the original untouched
    toolchain.fail_remux.store(true, Ordering::SeqCst);
    assert!(acc.repair_container().await.is_err());
    let body = std::fs::read(acc.container_path())?;
    assert_eq!(body, b"original-bytes");

    Ok(())
}
