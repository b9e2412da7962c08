//! Per-channel state and the driver's triangle LFO
//!
//! Each of the 16 MIDI channels carries volume, pan, pitch bend and a
//! modulation block. The LFO advances once per GBA frame with u8 phase
//! arithmetic, exactly as the driver's MPlayMain does.

/// Modulation applied by the channel LFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModType {
    /// Pitch modulation
    #[default]
    Vibrato,
    /// Volume modulation
    Tremolo,
    /// Pan modulation
    AutoPan,
}

impl ModType {
    /// Decode a MODT controller value; out-of-range values fall back to
    /// vibrato, matching the driver.
    pub fn from_value(value: i32) -> Self {
        match value {
            1 => ModType::Tremolo,
            2 => ModType::AutoPan,
            _ => ModType::Vibrato,
        }
    }
}

/// LFO and extended-command state of one channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelModState {
    /// Modulation depth (CC 1)
    pub modulation: u8,
    /// LFO speed added to the phase counter each frame (CC 21)
    pub lfo_speed: u8,
    /// LFO phase counter, wraps at 256
    pub lfo_phase: u8,
    /// What the LFO modulates (CC 22)
    pub mod_type: ModType,
    /// Fine tune in quarter-semitones, stored as value-64 (CC 24)
    pub fine_tune: i8,
    /// LFO start delay in frames (CC 26)
    pub lfo_delay: u8,
    /// Frames left before the LFO starts
    pub lfo_delay_countdown: u8,
    /// Current LFO output level
    pub mod_m: i8,
    /// Operand target for the next XCMD (CC 30)
    pub xcmd_type: u8,
    /// Pseudo-echo volume captured by notes at note-on
    pub pseudo_echo_vol: u8,
    /// Pseudo-echo length captured by notes at note-on
    pub pseudo_echo_len: u8,
}

impl ChannelModState {
    /// Silence the LFO and restart its delay, as MOD=0 / LFOS=0 do.
    pub fn reset_lfo(&mut self) {
        self.mod_m = 0;
        self.lfo_phase = 0;
        self.lfo_delay_countdown = self.lfo_delay;
    }

    /// Advance the LFO by one GBA frame.
    pub fn update_lfo(&mut self) {
        if self.lfo_speed == 0 || self.modulation == 0 {
            self.mod_m = 0;
            return;
        }
        if self.lfo_delay_countdown > 0 {
            self.lfo_delay_countdown -= 1;
            return;
        }
        self.lfo_phase = self.lfo_phase.wrapping_add(self.lfo_speed);
        let wave: i32 = if self.lfo_phase < 64 {
            self.lfo_phase as i32
        } else {
            128 - self.lfo_phase as i32
        };
        self.mod_m = ((self.modulation as i32 * wave) >> 6) as i8;
    }
}

/// Full state of one MIDI channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelState {
    /// Channel volume 0..1 (CC 7)
    pub volume: f32,
    /// Channel pan 0..1 (CC 10)
    pub pan: f32,
    /// Pitch bend in semitones
    pub pitch_bend: f32,
    /// Pitch bend range in semitones (CC 6, default 2)
    pub pitch_bend_range: i32,
    /// Modulation block
    pub modulation: ChannelModState,
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState {
            volume: 1.0,
            pan: 0.5,
            pitch_bend: 0.0,
            pitch_bend_range: 2,
            modulation: ChannelModState::default(),
        }
    }
}
