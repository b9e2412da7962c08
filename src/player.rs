//! Bank-to-engine glue
//!
//! [`Mp2kPlayer`] owns the voicegroup bank and a shared engine handle,
//! tracks the program selected on each MIDI channel, and resolves
//! (program, note) pairs through the keysplit tables before forwarding
//! events to the engine. It is what a sequencer (or the demo CLI) talks to.

use crate::engine::{Mp2kSynth, NUM_CHANNELS};
use crate::voicegroup::{GbaVoice, Voicegroup, VoicegroupBank, VoiceKind};
use std::path::PathBuf;
use std::sync::Arc;

/// One sequencer event, without timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqEvent {
    /// Start a note
    NoteOn {
        /// MIDI note 0..127
        note: i32,
        /// MIDI velocity 0..127
        velocity: i32,
        /// MIDI channel 0..15
        channel: i32,
    },
    /// Release a note
    NoteOff {
        /// MIDI note 0..127
        note: i32,
        /// MIDI channel 0..15
        channel: i32,
    },
    /// MIDI control change
    ControlChange {
        /// Controller number
        controller: i32,
        /// Controller value 0..127
        value: i32,
        /// MIDI channel 0..15
        channel: i32,
    },
    /// 14-bit signed pitch bend
    PitchBend {
        /// Bend value -8192..8191
        value: i32,
        /// MIDI channel 0..15
        channel: i32,
    },
    /// Select the program (voicegroup index) for a channel
    ProgramChange {
        /// Program number
        program: i32,
        /// MIDI channel 0..15
        channel: i32,
    },
}

/// A sequencer event with its wall-clock position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    /// Seconds from sequence start
    pub time_secs: f64,
    /// The event itself
    pub event: SeqEvent,
}

/// Drives an [`Mp2kSynth`] from a voicegroup bank.
pub struct Mp2kPlayer {
    bank: VoicegroupBank,
    voicegroup: Option<Arc<Voicegroup>>,
    synth: Arc<Mp2kSynth>,
    channel_program: [i32; NUM_CHANNELS],
}

impl Mp2kPlayer {
    /// Create a player over a GBA project directory and an engine handle.
    pub fn new<P: Into<PathBuf>>(project_dir: P, synth: Arc<Mp2kSynth>) -> Self {
        Mp2kPlayer {
            bank: VoicegroupBank::new(project_dir),
            voicegroup: None,
            synth,
            channel_program: [0; NUM_CHANNELS],
        }
    }

    /// Load `voicegroupNNN.inc` as the active bank.
    pub fn load_voicegroup(&mut self, num: u32) -> crate::Result<()> {
        let group = self.bank.load_voicegroup(num)?;
        log::info!("loaded voicegroup{:03} with {} voices", num, group.voices.len());
        self.voicegroup = Some(group);
        Ok(())
    }

    /// The engine this player drives.
    pub fn synth(&self) -> &Arc<Mp2kSynth> {
        &self.synth
    }

    /// The active voicegroup, if one is loaded.
    pub fn voicegroup(&self) -> Option<&Arc<Voicegroup>> {
        self.voicegroup.as_ref()
    }

    /// Resolve a (program, note) pair to the leaf voice that should sound,
    /// chasing a keysplit dispatch if the program has one.
    pub fn resolve_voice(&mut self, program: i32, note: i32) -> Option<Arc<GbaVoice>> {
        let group = self.voicegroup.as_ref()?;
        let voice = group.voice(usize::try_from(program).ok()?)?;
        match voice.kind {
            VoiceKind::Keysplit { .. } | VoiceKind::KeysplitAll { .. } => {
                let voice = Arc::clone(voice);
                self.bank.resolve_keysplit(&voice, note)
            }
            _ => Some(Arc::clone(voice)),
        }
    }

    /// Whether a program dispatches as a rhythm kit (its notes are
    /// pitch-locked to each sub-voice's own base key).
    pub fn is_rhythm_program(&self, program: i32) -> bool {
        let Some(group) = &self.voicegroup else {
            return false;
        };
        usize::try_from(program)
            .ok()
            .and_then(|p| group.voice(p))
            .map(|v| matches!(v.kind, VoiceKind::KeysplitAll { .. }))
            .unwrap_or(false)
    }

    /// Start a note on a channel using its selected program. Unresolvable
    /// notes are dropped.
    pub fn note_on(&mut self, note: i32, velocity: i32, channel: i32) {
        if !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        let program = self.channel_program[channel as usize];
        let is_rhythm = self.is_rhythm_program(program);
        if let Some(voice) = self.resolve_voice(program, note) {
            self.synth.note_on(note, velocity, channel, &voice, is_rhythm);
        }
    }

    /// Release a note.
    pub fn note_off(&self, note: i32, channel: i32) {
        self.synth.note_off(note, channel);
    }

    /// Forward a control change to the engine.
    pub fn control_change(&self, controller: i32, value: i32, channel: i32) {
        self.synth.control_change(controller, value, channel);
    }

    /// Forward a pitch bend to the engine.
    pub fn pitch_bend(&self, value: i32, channel: i32) {
        self.synth.pitch_bend(value, channel);
    }

    /// Select the program used by future note-ons on a channel.
    pub fn program_change(&mut self, program: i32, channel: i32) {
        if (0..NUM_CHANNELS as i32).contains(&channel) {
            self.channel_program[channel as usize] = program;
        }
    }

    /// Hard-kill everything on every channel.
    pub fn stop_all_notes(&self) {
        for channel in 0..NUM_CHANNELS as i32 {
            self.synth.all_notes_off(channel);
        }
    }

    /// Reset the engine and the per-channel program selection.
    pub fn reset(&mut self) {
        self.synth.reset();
        self.channel_program = [0; NUM_CHANNELS];
    }

    /// Dispatch one sequencer event.
    pub fn handle_event(&mut self, event: &SeqEvent) {
        match *event {
            SeqEvent::NoteOn {
                note,
                velocity,
                channel,
            } => self.note_on(note, velocity, channel),
            SeqEvent::NoteOff { note, channel } => self.note_off(note, channel),
            SeqEvent::ControlChange {
                controller,
                value,
                channel,
            } => self.control_change(controller, value, channel),
            SeqEvent::PitchBend { value, channel } => self.pitch_bend(value, channel),
            SeqEvent::ProgramChange { program, channel } => {
                self.program_change(program, channel)
            }
        }
    }
}
