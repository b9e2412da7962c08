//! Audio device integration using rodio
//!
//! An [`rodio::Source`] that renders from the shared engine in chunks. One
//! chunk is produced per mutex acquisition; individual samples then drain
//! from a local buffer without touching the lock.

use super::StreamConfig;
use crate::engine::Mp2kSynth;
use crate::{Mp2kError, Result};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio source that pulls stereo frames from the engine
struct EngineSource {
    synth: Arc<Mp2kSynth>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Chunk buffer; one engine render per refill
    buffer: Vec<f32>,
    buffer_pos: usize,
}

impl EngineSource {
    fn new(synth: Arc<Mp2kSynth>, config: StreamConfig, finished: Arc<AtomicBool>) -> Self {
        let len = config.chunk_frames * 2;
        EngineSource {
            synth,
            sample_rate: config.sample_rate,
            finished,
            buffer: vec![0.0f32; len],
            buffer_pos: len, // first next() triggers a render
        }
    }
}

impl Source for EngineSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.buffer.len())
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for EngineSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            self.synth.render(&mut self.buffer);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from the engine.
    pub fn new(synth: Arc<Mp2kSynth>, config: StreamConfig) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| Mp2kError::AudioDeviceError(format!("failed to create stream: {}", e)))?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| Mp2kError::AudioDeviceError(format!("failed to create sink: {}", e)))?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(EngineSource::new(synth, config, Arc::clone(&finished)));

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback.
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback.
    pub fn play(&self) {
        self.sink.play();
    }

    /// Stop the stream permanently; the source ends at its next chunk.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finish();
        self.sink.pause();
    }
}
