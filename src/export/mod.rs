//! Offline rendering
//!
//! Renders a timed event sequence through an offline engine in fixed-size
//! chunks, the same way the audio callback would, and hands the result to
//! the WAV writer.

mod wav;

pub use wav::export_to_wav;

use crate::engine::Mp2kSynth;
use crate::player::Mp2kPlayer;

/// Frames rendered per chunk between event dispatches.
const CHUNK_FRAMES: usize = 512;

/// Configuration for offline rendering.
#[derive(Debug, Clone, Copy)]
pub struct ExportConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Silence appended after the last event, for release/echo tails
    pub tail_secs: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            sample_rate: 44_100,
            tail_secs: 1.0,
        }
    }
}

/// Render a timed sequence to an interleaved stereo buffer.
///
/// Events must be sorted by time. The player's bank resolves voices; the
/// audio runs through a dedicated offline engine at the export rate, so a
/// live playback engine attached to the same player is not disturbed.
pub fn render_sequence(
    player: &mut Mp2kPlayer,
    events: &[crate::player::TimedEvent],
    config: ExportConfig,
) -> Vec<f32> {
    use crate::player::SeqEvent;

    let offline = Mp2kSynth::new(config.sample_rate);
    let mut program = [0i32; crate::engine::NUM_CHANNELS];

    let last_event_secs = events.last().map(|e| e.time_secs).unwrap_or(0.0);
    let total_frames =
        ((last_event_secs + config.tail_secs) * config.sample_rate as f64).ceil() as usize;

    let mut out = vec![0.0f32; total_frames * 2];
    let mut next_event = 0;
    let mut frames_rendered = 0usize;

    while frames_rendered < total_frames {
        let current_secs = frames_rendered as f64 / config.sample_rate as f64;

        while next_event < events.len() && events[next_event].time_secs <= current_secs {
            let timed = &events[next_event];
            next_event += 1;
            match timed.event {
                SeqEvent::NoteOn {
                    note,
                    velocity,
                    channel,
                } => {
                    if !(0..crate::engine::NUM_CHANNELS as i32).contains(&channel) {
                        continue;
                    }
                    let prog = program[channel as usize];
                    let is_rhythm = player.is_rhythm_program(prog);
                    if let Some(voice) = player.resolve_voice(prog, note) {
                        offline.note_on(note, velocity, channel, &voice, is_rhythm);
                    }
                }
                SeqEvent::NoteOff { note, channel } => offline.note_off(note, channel),
                SeqEvent::ControlChange {
                    controller,
                    value,
                    channel,
                } => offline.control_change(controller, value, channel),
                SeqEvent::PitchBend { value, channel } => offline.pitch_bend(value, channel),
                SeqEvent::ProgramChange {
                    program: prog,
                    channel,
                } => {
                    if (0..crate::engine::NUM_CHANNELS as i32).contains(&channel) {
                        program[channel as usize] = prog;
                    }
                }
            }
        }

        let chunk = CHUNK_FRAMES.min(total_frames - frames_rendered);
        let start = frames_rendered * 2;
        offline.render(&mut out[start..start + chunk * 2]);
        frames_rendered += chunk;
    }

    out
}
