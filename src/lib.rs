//! M4A (MusicPlayer2000 / "Sappy") sound driver synthesizer
//!
//! A software reproduction of the Game Boy Advance M4A sound driver, driven
//! by note/control events and producing stereo floating-point audio at a
//! chosen output sample rate. Instruments come from a GBA "voicegroup" bank
//! parsed out of disassembled project sources.
//!
//! # Features
//! - All four M4A tone-generator families: two square channels, noise,
//!   programmable wave, and DirectSound PCM voices
//! - Frame-accurate CGB (counter) and DirectSound (additive/multiplicative)
//!   envelopes, including the driver's pseudo-echo release tail
//! - Triangle-wave LFO with vibrato / tremolo / auto-pan modes
//! - Deterministic 24-slot voice stealing
//! - Voicegroup / keysplit / sample-index parsing from `.inc` sources with
//!   lazy 4-bit delta-PCM sample decoding
//! - Offline WAV export and optional real-time streaming playback
//!
//! # Crate feature flags
//! - `streaming` (opt-in): real-time audio output (enables the optional
//!   `rodio` dep)
//!
//! # Quick start
//! ## Render a note offline
//! ```no_run
//! use mp2k::{Mp2kPlayer, Mp2kSynth};
//! use std::sync::Arc;
//!
//! let synth = Arc::new(Mp2kSynth::new(44_100));
//! let mut player = Mp2kPlayer::new("path/to/gba/project", Arc::clone(&synth));
//! player.load_voicegroup(0).unwrap();
//! player.note_on(60, 100, 0);
//! let mut buffer = vec![0.0f32; 2 * 44_100];
//! synth.render(&mut buffer);
//! ```
//!
//! ## Export a timed sequence to WAV
//! ```no_run
//! use mp2k::export::{export_to_wav, ExportConfig};
//! use mp2k::player::{SeqEvent, TimedEvent};
//! use mp2k::{Mp2kPlayer, Mp2kSynth};
//! use std::sync::Arc;
//!
//! # fn main() -> mp2k::Result<()> {
//! let synth = Arc::new(Mp2kSynth::new(44_100));
//! let mut player = Mp2kPlayer::new("path/to/gba/project", Arc::clone(&synth));
//! player.load_voicegroup(42)?;
//! let events = vec![
//!     TimedEvent { time_secs: 0.0, event: SeqEvent::NoteOn { note: 60, velocity: 112, channel: 0 } },
//!     TimedEvent { time_secs: 1.0, event: SeqEvent::NoteOff { note: 60, channel: 0 } },
//! ];
//! export_to_wav(&mut player, &events, "out.wav", ExportConfig::default())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod export;
pub mod player;
pub mod sample;
#[cfg(feature = "streaming")]
pub mod streaming;
pub mod voicegroup;

/// Error types for M4A synthesizer operations
#[derive(thiserror::Error, Debug)]
pub enum Mp2kError {
    /// Sample blob is too short or otherwise undecodable
    #[error("malformed sample: {0}")]
    MalformedSample(String),

    /// A sample file referenced by an index could not be read
    #[error("missing sample file: {0}")]
    MissingSampleFile(String),

    /// A voicegroup `.inc` file could not be read
    #[error("missing voicegroup file: {0}")]
    MissingVoicegroupFile(String),

    /// A sample or table symbol is not present in any index
    #[error("missing symbol: {0}")]
    MissingSymbol(String),

    /// A value is outside its documented range
    #[error("value out of range: {0}")]
    RangeError(String),

    /// Audio device error
    #[error("audio device error: {0}")]
    AudioDeviceError(String),

    /// Audio file write error
    #[error("audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Mp2kError {
    fn from(msg: String) -> Self {
        Mp2kError::Other(msg)
    }
}

impl From<&str> for Mp2kError {
    fn from(msg: &str) -> Self {
        Mp2kError::Other(msg.to_string())
    }
}

/// Result type for synthesizer operations
pub type Result<T> = std::result::Result<T, Mp2kError>;

// Public API exports
pub use engine::Mp2kSynth;
pub use player::Mp2kPlayer;
pub use sample::GbaSample;
#[cfg(feature = "streaming")]
pub use streaming::{AudioDevice, StreamConfig};
pub use voicegroup::{GbaVoice, VoiceKind, Voicegroup, VoicegroupBank};
