//! Active voice state and envelope stepping
//!
//! Two envelope machines share one phase vocabulary. CGB voices (square,
//! noise, programmable wave) count frames between integer level steps in a
//! 0..15 range. DirectSound voices add the attack rate and multiply by the
//! decay/release rates in a 0..255 range. Both fall into a pseudo-echo tail
//! after release when the channel's echo volume is nonzero.

use crate::voicegroup::GbaVoice;
use std::sync::Arc;

/// Envelope phase of an active voice. Transitions are monotone except for
/// note re-trigger, and phases skip forward when their parameter is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopePhase {
    /// Rising toward the envelope goal
    Attack,
    /// Falling toward the sustain level
    Decay,
    /// Holding the sustain level
    Sustain,
    /// Falling toward silence (or the pseudo-echo level)
    Release,
    /// Holding the pseudo-echo level for a fixed number of frames
    Echo,
    /// Silent; the slot is free
    #[default]
    Off,
}

/// CGB envelope ceiling.
pub const CGB_ENVELOPE_GOAL: i32 = 15;
/// DirectSound envelope ceiling.
pub const DIRECT_SOUND_ENVELOPE_MAX: i32 = 255;

/// Runtime state of one sounding note.
#[derive(Debug, Clone, Default)]
pub struct ActiveVoice {
    /// Whether this slot is sounding
    pub active: bool,
    /// MIDI note that triggered the voice
    pub note: i32,
    /// MIDI velocity 0..127
    pub velocity: i32,
    /// MIDI channel 0..15
    pub channel: usize,
    /// Bank voice this slot plays; None while the slot is free
    pub voice: Option<Arc<GbaVoice>>,
    /// Rhythm voices are pitch-locked to their base key
    pub is_rhythm: bool,
    /// Monotone note-on sequence number, for deterministic stealing
    pub trigger_order: u64,

    /// Current envelope phase
    pub phase: EnvelopePhase,
    /// 0..255 for DirectSound, 0..15 for CGB voices
    pub envelope_volume: i32,
    /// Whether the CGB counter envelope applies
    pub is_cgb_voice: bool,
    /// CGB: frames remaining until the next level step
    pub envelope_counter: i32,
    /// CGB: attack target level
    pub envelope_goal: i32,
    /// CGB: computed sustain target level
    pub sustain_goal: i32,
    /// Pseudo-echo level, captured from the channel at note-on
    pub pseudo_echo_vol: u8,
    /// Pseudo-echo length in frames, captured at note-on
    pub pseudo_echo_len: i32,

    /// Pitch bend in semitones, copied from the channel
    pub pitch_bend: f32,

    // Sample playback (DirectSound, programmable wave)
    /// Fractional read position into the sample PCM
    pub sample_pos: f64,
    /// Read-position increment per output sample
    pub sample_step: f64,

    // Square wave
    /// Phase in cycles
    pub square_phase: f64,
    /// Phase increment per output sample
    pub square_phase_inc: f64,

    // Noise
    /// LFSR register
    pub lfsr: u16,
    /// Fractional sample counter toward the next LFSR clock
    pub noise_timer: f64,
    /// Output samples per LFSR clock
    pub noise_interval: f64,
    /// Last LFSR output level
    pub noise_output: i8,
    /// 7-bit LFSR mode (more tonal)
    pub noise_width_7bit: bool,

    /// Equal-power left gain
    pub pan_l: f32,
    /// Equal-power right gain
    pub pan_r: f32,
}

impl ActiveVoice {
    /// Retire the voice: phase Off, slot free.
    pub fn kill(&mut self) {
        self.active = false;
        self.phase = EnvelopePhase::Off;
    }

    /// Advance the envelope by one GBA frame.
    pub fn envelope_step(&mut self) {
        if self.phase == EnvelopePhase::Off {
            return;
        }
        let Some(voice) = self.voice.clone() else {
            return;
        };
        if self.is_cgb_voice {
            self.cgb_envelope_step(&voice);
        } else {
            self.direct_sound_envelope_step(&voice);
        }
    }

    /// CGB counter envelope: `attack`/`decay`/`release` are frame counts
    /// between one-level steps, `sustain` scales the 0..15 goal.
    fn cgb_envelope_step(&mut self, voice: &GbaVoice) {
        match self.phase {
            EnvelopePhase::Attack => {
                if voice.attack == 0 {
                    self.envelope_volume = self.envelope_goal;
                    self.phase = EnvelopePhase::Decay;
                    self.envelope_counter = voice.decay;
                } else {
                    self.envelope_counter -= 1;
                    if self.envelope_counter <= 0 {
                        self.envelope_volume += 1;
                        if self.envelope_volume >= self.envelope_goal {
                            self.envelope_volume = self.envelope_goal;
                            self.phase = EnvelopePhase::Decay;
                            self.envelope_counter = voice.decay;
                        } else {
                            self.envelope_counter = voice.attack;
                        }
                    }
                }
            }
            EnvelopePhase::Decay => {
                if voice.decay == 0 {
                    self.cgb_settle_to_sustain(voice);
                } else {
                    self.envelope_counter -= 1;
                    if self.envelope_counter <= 0 {
                        self.envelope_volume -= 1;
                        if self.envelope_volume <= self.sustain_goal {
                            self.cgb_settle_to_sustain(voice);
                        } else {
                            self.envelope_counter = voice.decay;
                        }
                    }
                }
            }
            EnvelopePhase::Sustain => {
                self.envelope_volume = self.sustain_goal;
            }
            EnvelopePhase::Release => {
                if voice.release == 0 {
                    self.envelope_volume = 0;
                    self.cgb_enter_echo_or_off();
                } else {
                    self.envelope_counter -= 1;
                    if self.envelope_counter <= 0 {
                        self.envelope_volume -= 1;
                        if self.envelope_volume <= 0 {
                            self.envelope_volume = 0;
                            self.cgb_enter_echo_or_off();
                        } else {
                            self.envelope_counter = voice.release;
                        }
                    }
                }
            }
            EnvelopePhase::Echo => self.echo_step(),
            EnvelopePhase::Off => {}
        }
    }

    fn cgb_settle_to_sustain(&mut self, voice: &GbaVoice) {
        if voice.sustain == 0 {
            self.envelope_volume = 0;
            self.kill();
        } else {
            self.envelope_volume = self.sustain_goal;
            self.phase = EnvelopePhase::Sustain;
        }
    }

    fn cgb_enter_echo_or_off(&mut self) {
        let echo_vol = (self.envelope_goal * self.pseudo_echo_vol as i32 + 0xFF) >> 8;
        if echo_vol > 0 {
            self.envelope_volume = echo_vol;
            self.phase = EnvelopePhase::Echo;
        } else {
            self.kill();
        }
    }

    /// DirectSound envelope: additive attack, multiplicative decay and
    /// release in 1/256 steps.
    fn direct_sound_envelope_step(&mut self, voice: &GbaVoice) {
        match self.phase {
            EnvelopePhase::Attack => {
                self.envelope_volume += voice.attack;
                if self.envelope_volume >= DIRECT_SOUND_ENVELOPE_MAX {
                    self.envelope_volume = DIRECT_SOUND_ENVELOPE_MAX;
                    self.phase = EnvelopePhase::Decay;
                }
            }
            EnvelopePhase::Decay => {
                self.envelope_volume = (self.envelope_volume * voice.decay) >> 8;
                if self.envelope_volume <= voice.sustain {
                    self.envelope_volume = voice.sustain;
                    if voice.sustain == 0 {
                        self.kill();
                    } else {
                        self.phase = EnvelopePhase::Sustain;
                    }
                }
            }
            EnvelopePhase::Sustain => {}
            EnvelopePhase::Release => {
                self.envelope_volume = (self.envelope_volume * voice.release) >> 8;
                if self.envelope_volume <= self.pseudo_echo_vol as i32 {
                    if self.pseudo_echo_vol == 0 {
                        self.envelope_volume = 0;
                        self.kill();
                    } else {
                        self.envelope_volume = self.pseudo_echo_vol as i32;
                        self.phase = EnvelopePhase::Echo;
                    }
                }
            }
            EnvelopePhase::Echo => self.echo_step(),
            EnvelopePhase::Off => {}
        }
    }

    fn echo_step(&mut self) {
        if self.pseudo_echo_len > 0 {
            self.pseudo_echo_len -= 1;
        }
        if self.pseudo_echo_len <= 0 {
            self.kill();
        }
    }
}
