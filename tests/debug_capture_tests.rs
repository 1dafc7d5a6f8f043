// Tests for the debug capture buffer and the per-session debug window

use anyhow::Result;
use bud_stream::audio::convert::pcm16_from_le_bytes;
use bud_stream::audio::debug::recording_file_name;
use bud_stream::audio::{AudioChunk, DebugCaptureBuffer, DebugConfig, DebugWindow};
use chrono::TimeZone;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn chunk(samples: Vec<i16>) -> AudioChunk {
    AudioChunk::new(samples, 0)
}

fn debug_config(dir: &TempDir) -> DebugConfig {
    DebugConfig {
        enabled: true,
        output_dir: dir.path().join("debug"),
        window: Duration::from_millis(5000),
    }
}

#[test]
fn test_recording_file_name_replaces_colons_and_dots() {
    let at = chrono::Utc
        .with_ymd_and_hms(2025, 10, 27, 14, 30, 5)
        .unwrap()
        + chrono::Duration::milliseconds(123);

    assert_eq!(
        recording_file_name(at),
        "debug-recording-2025-10-27T14-30-05-123Z.raw"
    );
}

#[test]
fn test_flush_writes_concatenated_pcm16() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path().join("debug");
    let mut buffer = DebugCaptureBuffer::new(&dir);

    buffer.record(chunk(vec![1, 2, 3]));
    buffer.record(chunk(vec![-4, 5]));

    let path = buffer.flush().expect("flush should write a file");

    assert!(dir.is_dir(), "debug directory is created on demand");
    assert!(path.starts_with(&dir));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("debug-recording-"));
    assert!(name.ends_with(".raw"));
    assert!(!name.contains(':'));

    let bytes = fs::read(&path)?;
    assert_eq!(bytes.len(), 10);
    assert_eq!(pcm16_from_le_bytes(&bytes), vec![1, 2, 3, -4, 5]);

    assert!(buffer.is_empty(), "flush clears the buffer");
    Ok(())
}

#[test]
fn test_flush_empty_buffer_is_noop() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path().join("debug");
    let mut buffer = DebugCaptureBuffer::new(&dir);

    assert!(buffer.flush().is_none());
    assert!(!dir.exists(), "nothing written, no directory created");
    Ok(())
}

#[test]
fn test_consecutive_flushes_get_distinct_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut buffer = DebugCaptureBuffer::new(temp_dir.path());

    buffer.record(chunk(vec![1]));
    let first = buffer.flush().unwrap();
    buffer.record(chunk(vec![2]));
    let second = buffer.flush().unwrap();

    assert_ne!(first, second);
    assert_eq!(fs::read_dir(temp_dir.path())?.count(), 2);
    Ok(())
}

#[test]
fn test_flush_write_failure_is_swallowed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // A regular file where the directory should be
    let blocked = temp_dir.path().join("debug");
    fs::write(&blocked, b"not a directory")?;

    let mut buffer = DebugCaptureBuffer::new(&blocked);
    buffer.record(chunk(vec![1, 2]));

    assert!(buffer.flush().is_none());
    assert!(buffer.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_window_accumulates_until_threshold_then_flushes_once() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = debug_config(&temp_dir);
    let started = Instant::now();
    let mut window = DebugWindow::open(&config, started);

    assert!(window.observe(&chunk(vec![1; 4]), started).is_none());
    assert!(window
        .observe(&chunk(vec![2; 4]), started + Duration::from_millis(4999))
        .is_none());
    assert_eq!(window.buffered_chunks(), 2);

    // First chunk at the threshold closes the window and is not recorded
    let recording = window
        .observe(&chunk(vec![3; 4]), started + Duration::from_millis(5000))
        .expect("threshold chunk hands over the buffer");
    assert!(!window.is_active());
    assert_eq!(recording.len_bytes(), 16);
    assert!(!config.output_dir.exists(), "nothing written until the recording is");

    let path = recording.write().expect("recording should be written");
    assert_eq!(pcm16_from_le_bytes(&fs::read(&path)?), vec![1, 1, 1, 1, 2, 2, 2, 2]);

    // Never reopens
    assert!(window
        .observe(&chunk(vec![4; 4]), started + Duration::from_millis(5100))
        .is_none());
    assert!(window.close().is_none());
    assert_eq!(fs::read_dir(&config.output_dir)?.count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_window_close_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = debug_config(&temp_dir);
    let mut window = DebugWindow::open(&config, Instant::now());

    window.observe(&chunk(vec![7; 8]), Instant::now());

    window.close().expect("buffered chunk").write().unwrap();
    assert!(window.close().is_none());
    assert_eq!(fs::read_dir(&config.output_dir)?.count(), 1);
    Ok(())
}
