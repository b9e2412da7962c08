//! Parsing and playback against an on-disk voicegroup project tree

use mp2k::player::Mp2kPlayer;
use mp2k::voicegroup::{VoiceKind, VoicegroupBank};
use mp2k::Mp2kSynth;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn sample_blob(flags: u32, rate: u32, loop_start: u32, payload: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(16 + payload.len());
    blob.extend_from_slice(&flags.to_le_bytes());
    blob.extend_from_slice(&(rate * 1024).to_le_bytes());
    blob.extend_from_slice(&loop_start.to_le_bytes());
    blob.extend_from_slice(&(payload.len() as u32 - 1).to_le_bytes());
    blob.extend_from_slice(payload);
    blob
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Build a minimal but complete GBA project tree:
/// voicegroup000 with DirectSound, square, keysplit, keysplit-all,
/// programmable-wave, unresolvable and unknown entries; a keysplit
/// sub-group; and a 40-voice drum kit.
fn build_project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    // Sample binaries
    let looped = 0x4000_0000u32;
    let piano_payload: Vec<u8> = (0..64)
        .map(|i| if i < 32 { 100u8 } else { 156u8 })
        .collect();
    fs::create_dir_all(root.join("sound/direct_sound_samples")).unwrap();
    fs::write(
        root.join("sound/direct_sound_samples/piano.bin"),
        sample_blob(looped, 22_050, 0, &piano_payload),
    )
    .unwrap();

    let drum_payload: Vec<u8> = (0..1000)
        .map(|i| if i % 16 < 8 { 90u8 } else { 166u8 })
        .collect();
    fs::write(
        root.join("sound/direct_sound_samples/drum.bin"),
        sample_blob(0, 22_050, 0, &drum_payload),
    )
    .unwrap();

    fs::write(
        root.join("sound/direct_sound_samples/comp.bin"),
        sample_blob(1, 8_000, 0, &[0x10, 0xFE]),
    )
    .unwrap();

    let wave_payload: Vec<u8> = (0..32).map(|i| (i * 8) as u8).collect();
    fs::create_dir_all(root.join("sound/programmable_wave_samples")).unwrap();
    fs::write(
        root.join("sound/programmable_wave_samples/wave.bin"),
        sample_blob(0, 0, 0, &wave_payload),
    )
    .unwrap();

    // Index files
    write(
        &root.join("sound/direct_sound_data.inc"),
        "\t.align 2\n\
         DirectSoundWaveData_piano:: @ acoustic piano\n\
         \t.incbin \"sound/direct_sound_samples/piano.bin\"\n\
         \n\
         DirectSoundWaveData_drum::\n\
         \t.incbin \"sound/direct_sound_samples/drum.bin\"\n\
         \n\
         DirectSoundWaveData_comp::\n\
         \t.incbin \"sound/direct_sound_samples/comp.bin\"\n",
    );
    write(
        &root.join("sound/programmable_wave_data.inc"),
        "ProgrammableWaveData_wave::\n\
         \t.incbin \"sound/programmable_wave_samples/wave.bin\"\n",
    );
    write(
        &root.join("sound/keysplit_tables.inc"),
        ".set KeySplitTable1, . - 36\n\
         \t.byte 1 @ 36\n\
         \t.byte 2 @ 37\n",
    );

    // Main voicegroup
    write(
        &root.join("sound/voicegroups/voicegroup000.inc"),
        "\t.align 2\n\
         voicegroup000:: @ main bank\n\
         \tvoice_directsound 60, 0, DirectSoundWaveData_piano, 255, 250, 200, 220\n\
         \tvoice_square_1 60, 0, 0, 2, 0, 2, 6, 7\n\
         \tvoice_keysplit voicegroup001, KeySplitTable1\n\
         \tvoice_keysplit_all voicegroup002\n\
         \tvoice_programmable_wave 60, 0, ProgrammableWaveData_wave, 0, 0, 15, 0\n\
         \tvoice_directsound 60, 0, DirectSoundWaveData_comp, 255, 250, 200, 220\n\
         \tvoice_directsound 60, 0, DirectSoundWaveData_missing, 255, 250, 200, 220\n\
         \tvoice_mystery_directive 1, 2, 3\n",
    );

    // Keysplit sub-group
    write(
        &root.join("sound/voicegroups/voicegroup001.inc"),
        "voicegroup001::\n\
         \tvoice_square_2 60, 0, 2, 0, 2, 6, 7\n\
         \tvoice_noise 60, 0, 0, 0, 2, 6, 7\n\
         \tvoice_directsound 60, 0, DirectSoundWaveData_piano, 255, 250, 200, 220\n",
    );

    // Drum kit: 40 one-shot voices with distinct base keys
    let mut drums = String::from("voicegroup002::\n");
    for i in 0..40 {
        drums.push_str(&format!(
            "\tvoice_directsound {}, 0, DirectSoundWaveData_drum, 255, 250, 0, 220\n",
            30 + i
        ));
    }
    write(&root.join("sound/voicegroups/voicegroup002.inc"), &drums);

    dir
}

#[test]
fn bank_parses_the_main_voicegroup() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();

    assert_eq!(group.voices.len(), 8);
    assert!(matches!(group.voices[0].kind, VoiceKind::DirectSound { .. }));
    assert!(matches!(group.voices[1].kind, VoiceKind::Square1 { .. }));
    assert!(matches!(group.voices[2].kind, VoiceKind::Keysplit { .. }));
    assert!(matches!(group.voices[3].kind, VoiceKind::KeysplitAll { .. }));
    assert!(matches!(group.voices[4].kind, VoiceKind::ProgWave { .. }));
    // Unknown directive parses as the empty sentinel
    assert!(group.voices[7].is_empty());
}

#[test]
fn samples_resolve_and_cache_by_path() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();

    let sample = group.voices[0].sample().expect("piano sample resolved");
    assert_eq!(sample.sample_rate, 22_050);
    assert!(sample.is_looped);
    assert_eq!(sample.num_samples, 64);
    assert_eq!(sample.pcm[0], 100);
    assert_eq!(sample.pcm[32], -100);

    // The sub-group references the same file; the cache must not grow
    let before = bank.cached_samples();
    bank.voicegroup("voicegroup001").unwrap();
    assert_eq!(bank.cached_samples(), before);
}

#[test]
fn compressed_sample_decodes_through_the_bank() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();

    let sample = group.voices[5].sample().expect("compressed sample resolved");
    assert!(sample.is_compressed);
    assert_eq!(sample.pcm, vec![0, 1, -3, -4]);
}

#[test]
fn unresolved_symbol_yields_silent_voice() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();

    match &group.voices[6].kind {
        VoiceKind::DirectSound { symbol, sample } => {
            assert_eq!(symbol, "DirectSoundWaveData_missing");
            assert!(sample.is_none());
        }
        other => panic!("unexpected kind {:?}", other),
    }

    // The silent voice still plays without disturbing the engine
    let synth = Mp2kSynth::new(44_100);
    synth.note_on(60, 100, 0, &group.voices[6], false);
    let mut out = vec![0.0f32; 2 * 1024];
    synth.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn keysplit_resolves_through_its_table() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();
    let keysplit = Arc::clone(&group.voices[2]);

    // Table maps note 36 -> 1, note 37 -> 2; unmapped notes -> 0
    let v = bank.resolve_keysplit(&keysplit, 36).unwrap();
    assert!(matches!(v.kind, VoiceKind::Noise { .. }));
    let v = bank.resolve_keysplit(&keysplit, 37).unwrap();
    assert!(matches!(v.kind, VoiceKind::DirectSound { .. }));
    let v = bank.resolve_keysplit(&keysplit, 20).unwrap();
    assert!(matches!(v.kind, VoiceKind::Square2 { .. }));

    // Non-keysplit voices do not resolve
    assert!(bank.resolve_keysplit(&group.voices[0], 60).is_none());
}

#[test]
fn keysplit_all_maps_note_to_sub_index() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    let group = bank.load_voicegroup(0).unwrap();
    let kit = Arc::clone(&group.voices[3]);

    let v = bank.resolve_keysplit(&kit, 36).unwrap();
    assert_eq!(v.base_midi_key, 30 + 36);
    let v = bank.resolve_keysplit(&kit, 0).unwrap();
    assert_eq!(v.base_midi_key, 30);
    // Notes past the kit's size resolve to nothing
    assert!(bank.resolve_keysplit(&kit, 80).is_none());
}

#[test]
fn drum_program_is_rhythm_and_audible() {
    let dir = build_project();
    let synth = Arc::new(Mp2kSynth::new(44_100));
    let mut player = Mp2kPlayer::new(dir.path(), Arc::clone(&synth));
    player.load_voicegroup(0).unwrap();

    assert!(player.is_rhythm_program(3));
    assert!(!player.is_rhythm_program(0));

    let resolved = player.resolve_voice(3, 36).expect("drum note resolves");
    assert_eq!(resolved.base_midi_key, 66);

    player.program_change(3, 9);
    player.note_on(36, 127, 9);
    assert_eq!(synth.active_voice_count(), 1);

    // Rhythm voices ignore bend entirely; this must not retune or kill it
    player.pitch_bend(8191, 9);

    let mut out = vec![0.0f32; 2 * 8192];
    synth.render(&mut out);
    assert!(out.iter().any(|&s| s != 0.0));
}

#[test]
fn melodic_note_end_to_end_audio() {
    let dir = build_project();
    let synth = Arc::new(Mp2kSynth::new(44_100));
    let mut player = Mp2kPlayer::new(dir.path(), Arc::clone(&synth));
    player.load_voicegroup(0).unwrap();

    player.note_on(60, 112, 0);
    let mut out = vec![0.0f32; 2 * 8820]; // 200 ms
    synth.render(&mut out);

    let energy: f64 = out.iter().map(|&s| (s as f64) * (s as f64)).sum();
    assert!(energy > 0.0);
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));

    player.note_off(60, 0);
    let mut tail = vec![0.0f32; 2 * 44_100];
    synth.render(&mut tail);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn missing_voicegroup_is_an_error() {
    let dir = build_project();
    let mut bank = VoicegroupBank::new(dir.path());
    assert!(bank.load_voicegroup(99).is_err());
}
