//! M4A synthesis engine
//!
//! A fixed pool of 24 voices and 16 channel states, driven by two
//! timebases: per-sample oscillator stepping and a ~59.7275 Hz GBA frame
//! tick for envelopes, LFOs and vibrato pitch updates.
//!
//! The engine is an opaque handle owning one mutex. Event calls (note
//! on/off, control change, pitch bend) and the audio callback's `render`
//! both acquire it; the callback holds it for the duration of one buffer
//! fill, so events arriving mid-buffer are deferred to the next boundary
//! and can never tear envelope or oscillator state.

pub mod channel;
pub mod frame_sync;
pub mod oscillator;
pub mod tables;
pub mod voice;

use channel::{ChannelState, ModType};
use frame_sync::FrameSync;
use parking_lot::Mutex;
use std::sync::Arc;
use voice::{ActiveVoice, EnvelopePhase, CGB_ENVELOPE_GOAL, DIRECT_SOUND_ENVELOPE_MAX};

use crate::voicegroup::{GbaVoice, VoiceKind};

/// Size of the voice pool. A 25th simultaneous note steals a slot.
pub const MAX_VOICES: usize = 24;

/// Number of MIDI channels.
pub const NUM_CHANNELS: usize = 16;

/// Output scale applied after mixing, before clipping.
const MASTER_GAIN: f32 = 1.0 / 8.0;

/// The GBA mixer's natural output rate; hosts usually override it.
pub const DEFAULT_SAMPLE_RATE: u32 = 13_379;

const PI_OVER_2: f32 = std::f32::consts::FRAC_PI_2;

/// The M4A synthesis engine.
///
/// All methods are thread-safe: one engine-wide mutex serializes the event
/// thread against the audio callback.
pub struct Mp2kSynth {
    state: Mutex<EngineState>,
}

struct EngineState {
    sample_rate: u32,
    voices: [ActiveVoice; MAX_VOICES],
    channels: [ChannelState; NUM_CHANNELS],
    frame_sync: FrameSync,
    next_trigger_order: u64,
}

impl Mp2kSynth {
    /// Create an engine producing audio at the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Mp2kSynth {
            state: Mutex::new(EngineState {
                sample_rate,
                voices: std::array::from_fn(|_| ActiveVoice::default()),
                channels: [ChannelState::default(); NUM_CHANNELS],
                frame_sync: FrameSync::new(sample_rate),
                next_trigger_order: 0,
            }),
        }
    }

    /// Change the output sample rate. Steps of already-sounding voices are
    /// not recomputed; they drift until their next pitch update.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut state = self.state.lock();
        state.sample_rate = sample_rate;
        state.frame_sync.set_sample_rate(sample_rate);
    }

    /// Current output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    /// Silence all voices and restore every channel to its defaults.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        for v in state.voices.iter_mut() {
            *v = ActiveVoice::default();
        }
        state.channels = [ChannelState::default(); NUM_CHANNELS];
        state.frame_sync.reset();
        state.next_trigger_order = 0;
    }

    /// Start a note. Empty voices and out-of-range channels are dropped.
    /// An already-sounding (channel, note) pair is retired first.
    pub fn note_on(
        &self,
        note: i32,
        velocity: i32,
        channel: i32,
        voice: &Arc<GbaVoice>,
        is_rhythm: bool,
    ) {
        if voice.is_empty() || !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        self.state
            .lock()
            .note_on(note, velocity, channel as usize, voice, is_rhythm);
    }

    /// Release a note into its envelope release (or pseudo-echo) tail.
    pub fn note_off(&self, note: i32, channel: i32) {
        if !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        let mut state = self.state.lock();
        let channel = channel as usize;
        for v in state.voices.iter_mut() {
            if v.active
                && v.note == note
                && v.channel == channel
                && !matches!(
                    v.phase,
                    EnvelopePhase::Release | EnvelopePhase::Echo | EnvelopePhase::Off
                )
            {
                v.phase = EnvelopePhase::Release;
                if v.is_cgb_voice {
                    if let Some(voice) = &v.voice {
                        v.envelope_counter = voice.release;
                    }
                }
            }
        }
    }

    /// Hard-kill every voice on a channel.
    pub fn all_notes_off(&self, channel: i32) {
        if !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        self.state.lock().all_notes_off(channel as usize);
    }

    /// Dispatch a MIDI control change. Unrecognized controllers are
    /// ignored.
    pub fn control_change(&self, controller: i32, value: i32, channel: i32) {
        if !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        self.state
            .lock()
            .control_change(controller, value, channel as usize);
    }

    /// Apply a 14-bit signed pitch bend (-8192..8191) scaled by the
    /// channel's bend range, and retune all sounding voices on the channel.
    pub fn pitch_bend(&self, value: i32, channel: i32) {
        if !(0..NUM_CHANNELS as i32).contains(&channel) {
            return;
        }
        self.state.lock().pitch_bend(value, channel as usize);
    }

    /// Fill an interleaved stereo buffer. The frame count is
    /// `out.len() / 2`; a trailing odd sample is zeroed.
    ///
    /// Never allocates, never fails; output is clipped to [-1, 1].
    pub fn render(&self, out: &mut [f32]) {
        self.state.lock().render(out);
    }

    /// Number of currently sounding voices (diagnostics).
    pub fn active_voice_count(&self) -> usize {
        self.state.lock().voices.iter().filter(|v| v.active).count()
    }
}

impl EngineState {
    /// Pick the slot for a new note.
    ///
    /// Preference order: a free slot, then the quietest echo-tail voice,
    /// then the quietest releasing voice, then the quietest voice not in
    /// attack, and only then the oldest attacking voice. Attack voices are
    /// protected so that simultaneous notes (especially drums) don't steal
    /// each other before producing audio; the oldest-first fallback keeps
    /// the choice deterministic regardless of callback timing.
    fn find_free_voice(&self) -> usize {
        if let Some(idx) = self.voices.iter().position(|v| !v.active) {
            return idx;
        }

        let quietest_in = |phase: EnvelopePhase| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.phase == phase)
                .min_by_key(|(_, v)| v.envelope_volume)
                .map(|(i, _)| i)
        };

        if let Some(idx) = quietest_in(EnvelopePhase::Echo) {
            return idx;
        }
        if let Some(idx) = quietest_in(EnvelopePhase::Release) {
            return idx;
        }
        if let Some(idx) = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.phase != EnvelopePhase::Attack)
            .min_by_key(|(_, v)| v.envelope_volume)
            .map(|(i, _)| i)
        {
            return idx;
        }

        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.trigger_order)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn note_on(
        &mut self,
        note: i32,
        velocity: i32,
        channel: usize,
        voice: &Arc<GbaVoice>,
        is_rhythm: bool,
    ) {
        // Re-trigger: the driver retires an existing voice on the same
        // note+channel before allocating
        for v in self.voices.iter_mut() {
            if v.active && v.note == note && v.channel == channel {
                v.kill();
            }
        }

        let idx = self.find_free_voice();
        let trigger_order = self.next_trigger_order;
        self.next_trigger_order += 1;

        let ch = &self.channels[channel];
        let v = &mut self.voices[idx];
        *v = ActiveVoice {
            active: true,
            note,
            velocity,
            channel,
            voice: Some(Arc::clone(voice)),
            is_rhythm,
            trigger_order,
            pitch_bend: ch.pitch_bend,
            pseudo_echo_vol: ch.modulation.pseudo_echo_vol,
            pseudo_echo_len: ch.modulation.pseudo_echo_len as i32,
            is_cgb_voice: voice.is_cgb(),
            ..ActiveVoice::default()
        };

        if v.is_cgb_voice {
            v.envelope_goal = CGB_ENVELOPE_GOAL;
            v.sustain_goal = (v.envelope_goal * voice.sustain + 15) >> 4;
            if voice.attack == 0 {
                // Instant attack: start decay from the goal level
                v.envelope_volume = v.envelope_goal;
                v.phase = EnvelopePhase::Decay;
                v.envelope_counter = voice.decay;
            } else {
                v.envelope_volume = 0;
                v.phase = EnvelopePhase::Attack;
                v.envelope_counter = voice.attack;
            }
        } else {
            v.envelope_volume = 0;
            v.phase = EnvelopePhase::Attack;
        }

        // Voice pan averaged with channel pan, stored as equal-power gains
        let voice_pan = if voice.pan != 0 {
            voice.pan as f32 / 127.0
        } else {
            0.5
        };
        let pan = (voice_pan + ch.pan) * 0.5;
        v.pan_l = (pan * PI_OVER_2).cos();
        v.pan_r = (pan * PI_OVER_2).sin();

        // Drum voices play at the resolved voice's own key regardless of
        // the incoming note
        let pitch_key = if is_rhythm { voice.base_midi_key } else { note };

        match &voice.kind {
            VoiceKind::DirectSound { sample, .. } => {
                v.sample_pos = 0.0;
                v.sample_step = match sample {
                    Some(sample) if sample.sample_rate > 0 => {
                        let target = tables::midi_note_to_hz(pitch_key);
                        let base = tables::midi_note_to_hz(voice.base_midi_key);
                        (target / base) as f64 * sample.sample_rate as f64
                            / self.sample_rate as f64
                    }
                    _ => 1.0,
                };
            }
            VoiceKind::ProgWave { sample, .. } => {
                let reg = tables::midi_key_to_cgb_reg(pitch_key, 0);
                let freq = tables::cgb_wave_reg_to_hz(reg);
                let num_samples = sample
                    .as_ref()
                    .map(|s| s.pcm.len())
                    .filter(|&n| n > 0)
                    .unwrap_or(32);
                v.sample_pos = 0.0;
                v.sample_step = freq * num_samples as f64 / self.sample_rate as f64;
            }
            VoiceKind::Square1 { .. } | VoiceKind::Square2 { .. } => {
                let reg = tables::midi_key_to_cgb_reg(pitch_key, 0);
                v.square_phase = 0.0;
                v.square_phase_inc =
                    tables::cgb_square_reg_to_hz(reg) / self.sample_rate as f64;
            }
            VoiceKind::Noise { period } => {
                let noise_freq = tables::noise_key_to_hz(pitch_key);
                v.lfsr = 0x7FFF;
                v.noise_timer = 0.0;
                v.noise_interval = self.sample_rate as f64 / noise_freq;
                v.noise_output = 0;
                v.noise_width_7bit = *period != 0;
            }
            VoiceKind::Keysplit { .. } | VoiceKind::KeysplitAll { .. } | VoiceKind::Empty => {}
        }

        // VBlank-accurate: event processing and the first envelope tick
        // share a frame on hardware. Without this, a noteOff arriving
        // before the first render would find the envelope still at 0 and
        // the multiplicative release would kill the note silently.
        if v.phase == EnvelopePhase::Attack {
            v.envelope_step();
        }
    }

    fn all_notes_off(&mut self, channel: usize) {
        for v in self.voices.iter_mut() {
            if v.active && v.channel == channel {
                v.kill();
            }
        }
    }

    fn control_change(&mut self, controller: i32, value: i32, channel: usize) {
        if controller == 123 {
            self.all_notes_off(channel);
            return;
        }

        let ch = &mut self.channels[channel];
        let m = &mut ch.modulation;
        match controller {
            1 => {
                m.modulation = value as u8;
                if value == 0 {
                    m.reset_lfo();
                }
            }
            6 => ch.pitch_bend_range = value,
            7 => ch.volume = value as f32 / 127.0,
            10 => ch.pan = value as f32 / 127.0,
            21 => {
                m.lfo_speed = value as u8;
                if value == 0 {
                    m.reset_lfo();
                }
            }
            22 => m.mod_type = ModType::from_value(value),
            24 => m.fine_tune = (value - 64) as i8,
            26 => {
                m.lfo_delay = value as u8;
                m.lfo_delay_countdown = value as u8;
            }
            29 => match m.xcmd_type {
                8 => m.pseudo_echo_vol = value as u8,
                9 => m.pseudo_echo_len = value as u8,
                _ => {}
            },
            30 => m.xcmd_type = value as u8,
            _ => {}
        }
    }

    fn pitch_bend(&mut self, value: i32, channel: usize) {
        let semitones =
            value as f32 / 8192.0 * self.channels[channel].pitch_bend_range as f32;
        self.channels[channel].pitch_bend = semitones;

        let (voices, channels, sample_rate) =
            (&mut self.voices, &self.channels, self.sample_rate);
        for v in voices.iter_mut() {
            if v.active && v.channel == channel {
                v.pitch_bend = semitones;
                update_voice_pitch(v, &channels[channel], sample_rate);
            }
        }
    }

    fn render(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        out.fill(0.0);

        let EngineState {
            sample_rate,
            voices,
            channels,
            frame_sync,
            ..
        } = self;
        let sample_rate = *sample_rate;

        let mut prev_mod_m = [0i8; NUM_CHANNELS];
        for (prev, ch) in prev_mod_m.iter_mut().zip(channels.iter()) {
            *prev = ch.modulation.mod_m;
        }

        for frame in 0..frames {
            if frame_sync.clock() {
                for (prev, ch) in prev_mod_m.iter_mut().zip(channels.iter_mut()) {
                    *prev = ch.modulation.mod_m;
                    ch.modulation.update_lfo();
                }

                for v in voices.iter_mut() {
                    if !v.active {
                        continue;
                    }
                    v.envelope_step();
                    if !v.active {
                        continue;
                    }
                    let ch = &channels[v.channel];
                    if ch.modulation.mod_type == ModType::Vibrato
                        && ch.modulation.mod_m != prev_mod_m[v.channel]
                    {
                        update_voice_pitch(v, ch, sample_rate);
                    }
                }
            }

            for v in voices.iter_mut() {
                if !v.active {
                    continue;
                }
                let Some(bank_voice) = v.voice.clone() else {
                    continue;
                };

                let sample = match &bank_voice.kind {
                    VoiceKind::DirectSound { sample, .. } => match sample {
                        Some(sample) => oscillator::render_direct_sound(v, sample),
                        None => 0.0,
                    },
                    VoiceKind::Square1 { duty_cycle, .. }
                    | VoiceKind::Square2 { duty_cycle } => {
                        oscillator::render_square_wave(v, *duty_cycle)
                    }
                    VoiceKind::Noise { .. } => oscillator::render_noise(v),
                    VoiceKind::ProgWave { sample, .. } => match sample {
                        Some(sample) => oscillator::render_prog_wave(v, sample),
                        None => 0.0,
                    },
                    _ => 0.0,
                };

                if !v.active {
                    continue;
                }

                let env_max = if v.is_cgb_voice {
                    CGB_ENVELOPE_GOAL as f32
                } else {
                    DIRECT_SOUND_ENVELOPE_MAX as f32
                };
                let mut gain =
                    sample * (v.envelope_volume as f32 / env_max) * (v.velocity as f32 / 127.0);

                let m = &channels[v.channel].modulation;
                if m.mod_type == ModType::Tremolo && m.mod_m != 0 {
                    gain *= (m.mod_m as i32 + 128) as f32 / 128.0;
                }
                gain *= channels[v.channel].volume;

                let (mut pan_l, mut pan_r) = (v.pan_l, v.pan_r);
                if m.mod_type == ModType::AutoPan && m.mod_m != 0 {
                    let base_pan = pan_r.atan2(pan_l) / PI_OVER_2;
                    let new_pan = (base_pan + m.mod_m as f32 / 256.0).clamp(0.0, 1.0);
                    pan_l = (new_pan * PI_OVER_2).cos();
                    pan_r = (new_pan * PI_OVER_2).sin();
                }

                out[frame * 2] += gain * pan_l;
                out[frame * 2 + 1] += gain * pan_r;
            }
        }

        for s in out.iter_mut() {
            *s = (*s * MASTER_GAIN).clamp(-1.0, 1.0);
        }
    }
}

/// Recompute a voice's oscillator step from its note, pitch bend, channel
/// fine tune and vibrato, in 1/256-semitone units. Rhythm voices ignore all
/// pitch modulation.
fn update_voice_pitch(v: &mut ActiveVoice, ch: &ChannelState, sample_rate: u32) {
    if !v.active || v.is_rhythm {
        return;
    }
    let Some(voice) = v.voice.clone() else {
        return;
    };

    let tune_x = ch.modulation.fine_tune as i32 * 4;
    let bend_x = (v.pitch_bend * 256.0) as i32;
    let vibrato_x = if ch.modulation.mod_type == ModType::Vibrato {
        16 * ch.modulation.mod_m as i32
    } else {
        0
    };
    let total_semi = (bend_x + tune_x + vibrato_x) as f32 / 256.0;

    // Split into integer semitone plus a 0..255 fine adjustment
    let mut int_semi = total_semi.floor() as i32;
    let mut fine = ((total_semi - int_semi as f32) * 256.0) as i32;
    if fine < 0 {
        int_semi -= 1;
        fine += 256;
    }
    let fine = fine.min(255);

    match &voice.kind {
        VoiceKind::DirectSound { sample, .. } => {
            if let Some(sample) = sample {
                if sample.sample_rate > 0 {
                    let target = tables::midi_note_to_hz(v.note)
                        * 2.0_f32.powf(total_semi / 12.0);
                    let base = tables::midi_note_to_hz(voice.base_midi_key);
                    v.sample_step = (target / base) as f64 * sample.sample_rate as f64
                        / sample_rate as f64;
                }
            }
        }
        VoiceKind::Square1 { .. } | VoiceKind::Square2 { .. } => {
            let reg = tables::midi_key_to_cgb_reg(v.note + int_semi, fine);
            v.square_phase_inc = tables::cgb_square_reg_to_hz(reg) / sample_rate as f64;
        }
        VoiceKind::ProgWave { sample, .. } => {
            let reg = tables::midi_key_to_cgb_reg(v.note + int_semi, fine);
            let freq = tables::cgb_wave_reg_to_hz(reg);
            let num_samples = sample
                .as_ref()
                .map(|s| s.pcm.len())
                .filter(|&n| n > 0)
                .unwrap_or(32);
            v.sample_step = freq * num_samples as f64 / sample_rate as f64;
        }
        VoiceKind::Noise { .. } => {
            let noise_freq = tables::noise_key_to_hz(v.note + int_semi);
            v.noise_interval = sample_rate as f64 / noise_freq;
        }
        VoiceKind::Keysplit { .. } | VoiceKind::KeysplitAll { .. } | VoiceKind::Empty => {}
    }
}
