//! Voicegroup instrument banks
//!
//! A voicegroup is an ordered bank of voices indexed by MIDI program
//! number, parsed from the assembler-syntax `.inc` sources of a
//! disassembled GBA project. Keysplit voices dispatch to a sub-voicegroup
//! by note, either through a 128-byte lookup table or by using the note
//! directly as the sub-index.
//!
//! The bank memoizes voicegroups by name and decoded samples by path; the
//! caches are grow-only and safe to share read-only once playback starts.

mod parser;

use crate::sample::GbaSample;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Fixed 128-byte mapping from MIDI note to sub-voicegroup index.
pub type KeysplitTable = [u8; 128];

/// Tone-generator family and variant-specific parameters of a voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceKind {
    /// PCM sample playback through the DirectSound mixer
    DirectSound {
        /// Sample symbol as written in the voicegroup source
        symbol: String,
        /// Decoded sample; None when the symbol did not resolve (the voice
        /// then plays silently)
        sample: Option<Arc<GbaSample>>,
    },
    /// CGB square channel 1 (the sweep register is parsed but not honored)
    Square1 {
        /// Hardware sweep register value, unused
        sweep: i32,
        /// Duty cycle selector 0..3
        duty_cycle: i32,
    },
    /// CGB square channel 2
    Square2 {
        /// Duty cycle selector 0..3
        duty_cycle: i32,
    },
    /// CGB programmable wave channel
    ProgWave {
        /// Wave-data symbol as written in the voicegroup source
        symbol: String,
        /// Decoded waveform; None when the symbol did not resolve
        sample: Option<Arc<GbaSample>>,
    },
    /// CGB noise channel
    Noise {
        /// 0 selects the 15-bit LFSR, nonzero the 7-bit LFSR
        period: i32,
    },
    /// Dispatch by note through a keysplit lookup table
    Keysplit {
        /// Sub-voicegroup symbol
        sub_voicegroup: String,
        /// Keysplit table symbol
        table: String,
    },
    /// Dispatch by note used directly as the sub-voicegroup index
    KeysplitAll {
        /// Sub-voicegroup symbol
        sub_voicegroup: String,
    },
    /// Unrecognized or absent directive; note-ons are dropped
    Empty,
}

/// One instrument slot of a voicegroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GbaVoice {
    /// Tone generator and variant parameters
    pub kind: VoiceKind,
    /// MIDI key at which a sample plays at its natural pitch
    pub base_midi_key: i32,
    /// 0 = centre, otherwise 0..127
    pub pan: i32,
    /// Envelope attack (meaning depends on the generator family)
    pub attack: i32,
    /// Envelope decay
    pub decay: i32,
    /// Envelope sustain
    pub sustain: i32,
    /// Envelope release
    pub release: i32,
}

impl GbaVoice {
    /// An empty voice; note-ons against it are dropped.
    pub fn empty() -> Self {
        GbaVoice {
            kind: VoiceKind::Empty,
            base_midi_key: 60,
            pan: 0,
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
        }
    }

    /// Whether this voice uses the CGB counter-based envelope.
    pub fn is_cgb(&self) -> bool {
        matches!(
            self.kind,
            VoiceKind::Square1 { .. }
                | VoiceKind::Square2 { .. }
                | VoiceKind::ProgWave { .. }
                | VoiceKind::Noise { .. }
        )
    }

    /// Whether this voice is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, VoiceKind::Empty)
    }

    /// The decoded sample, for the sample-backed generator families.
    pub fn sample(&self) -> Option<&Arc<GbaSample>> {
        match &self.kind {
            VoiceKind::DirectSound { sample, .. } | VoiceKind::ProgWave { sample, .. } => {
                sample.as_ref()
            }
            _ => None,
        }
    }
}

/// An ordered bank of voices, indexed by MIDI program number.
#[derive(Debug, Clone, Default)]
pub struct Voicegroup {
    /// Voices in directive order, program 0 first
    pub voices: Vec<Arc<GbaVoice>>,
}

impl Voicegroup {
    /// Voice at a program index, if present.
    pub fn voice(&self, program: usize) -> Option<&Arc<GbaVoice>> {
        self.voices.get(program)
    }
}

/// Parses and caches voicegroups, keysplit tables and samples from a GBA
/// project directory.
///
/// The three index files (`sound/direct_sound_data.inc`,
/// `sound/programmable_wave_data.inc`, `sound/keysplit_tables.inc`) are
/// parsed lazily on first use; missing files leave their index empty so the
/// engine can still run partial content.
pub struct VoicegroupBank {
    project_dir: PathBuf,
    direct_sound_paths: HashMap<String, PathBuf>,
    prog_wave_paths: HashMap<String, PathBuf>,
    keysplit_tables: HashMap<String, KeysplitTable>,
    sample_cache: HashMap<PathBuf, Arc<GbaSample>>,
    voicegroup_cache: HashMap<String, Arc<Voicegroup>>,
}

impl VoicegroupBank {
    /// Create a bank rooted at a GBA project directory (the directory that
    /// contains `sound/`).
    pub fn new<P: Into<PathBuf>>(project_dir: P) -> Self {
        VoicegroupBank {
            project_dir: project_dir.into(),
            direct_sound_paths: HashMap::new(),
            prog_wave_paths: HashMap::new(),
            keysplit_tables: HashMap::new(),
            sample_cache: HashMap::new(),
            voicegroup_cache: HashMap::new(),
        }
    }

    /// Load `sound/voicegroups/voicegroupNNN.inc` by number.
    pub fn load_voicegroup(&mut self, num: u32) -> crate::Result<Arc<Voicegroup>> {
        self.voicegroup(&format!("voicegroup{:03}", num))
    }

    /// Load a voicegroup by name, parsing it on first use.
    pub fn voicegroup(&mut self, name: &str) -> crate::Result<Arc<Voicegroup>> {
        self.ensure_indexes();
        if let Some(group) = self.voicegroup_cache.get(name) {
            return Ok(Arc::clone(group));
        }
        let group = Arc::new(self.parse_voicegroup_file(name)?);
        self.voicegroup_cache
            .insert(name.to_string(), Arc::clone(&group));
        Ok(group)
    }

    /// Keysplit table by name, if it was present in the index file.
    pub fn keysplit_table(&self, name: &str) -> Option<&KeysplitTable> {
        self.keysplit_tables.get(name)
    }

    /// Resolve a keysplit voice to its leaf voice for a MIDI note.
    ///
    /// For non-keysplit voices the caller should use the voice as-is;
    /// this returns None for them, as it does when the sub-voicegroup or
    /// table cannot be found. Resolution is single-level: a leaf that is
    /// itself a keysplit is not chased further.
    pub fn resolve_keysplit(&mut self, voice: &GbaVoice, note: i32) -> Option<Arc<GbaVoice>> {
        self.ensure_indexes();
        let note = note.clamp(0, 127) as usize;

        match &voice.kind {
            VoiceKind::KeysplitAll { sub_voicegroup } => {
                let sub_voicegroup = sub_voicegroup.clone();
                let group = match self.voicegroup(&sub_voicegroup) {
                    Ok(group) => group,
                    Err(e) => {
                        log::warn!("keysplit sub-voicegroup {}: {}", sub_voicegroup, e);
                        return None;
                    }
                };
                group.voice(note).cloned()
            }
            VoiceKind::Keysplit {
                sub_voicegroup,
                table,
            } => {
                let sub_voicegroup = sub_voicegroup.clone();
                let voice_idx = match self.keysplit_tables.get(table.as_str()) {
                    Some(table) => table[note] as usize,
                    None => {
                        log::warn!("keysplit table {} not found", table);
                        return None;
                    }
                };
                let group = match self.voicegroup(&sub_voicegroup) {
                    Ok(group) => group,
                    Err(e) => {
                        log::warn!("keysplit sub-voicegroup {}: {}", sub_voicegroup, e);
                        return None;
                    }
                };
                group.voice(voice_idx).cloned()
            }
            _ => None,
        }
    }

    /// Number of cached voicegroups (diagnostics).
    pub fn cached_voicegroups(&self) -> usize {
        self.voicegroup_cache.len()
    }

    /// Number of cached decoded samples (diagnostics).
    pub fn cached_samples(&self) -> usize {
        self.sample_cache.len()
    }

    fn ensure_indexes(&mut self) {
        if self.direct_sound_paths.is_empty() {
            let path = self.project_dir.join("sound/direct_sound_data.inc");
            self.direct_sound_paths = parser::parse_incbin_index(&path);
        }
        if self.prog_wave_paths.is_empty() {
            let path = self.project_dir.join("sound/programmable_wave_data.inc");
            self.prog_wave_paths = parser::parse_incbin_index(&path);
        }
        if self.keysplit_tables.is_empty() {
            let path = self.project_dir.join("sound/keysplit_tables.inc");
            self.keysplit_tables = parser::parse_keysplit_tables(&path);
        }
    }

    /// Resolve a sample symbol through the DirectSound index first, then
    /// the programmable-wave index, loading and caching the file on first
    /// use. Unresolvable symbols log and return None.
    fn resolve_sample(&mut self, symbol: &str) -> Option<Arc<GbaSample>> {
        let rel_path = match self
            .direct_sound_paths
            .get(symbol)
            .or_else(|| self.prog_wave_paths.get(symbol))
        {
            Some(rel_path) => rel_path,
            None => {
                log::warn!("sample symbol {} not present in any index", symbol);
                return None;
            }
        };
        let path = self.project_dir.join(rel_path);

        if let Some(sample) = self.sample_cache.get(&path) {
            return Some(Arc::clone(sample));
        }

        match GbaSample::load(&path) {
            Ok(sample) => {
                let sample = Arc::new(sample);
                self.sample_cache.insert(path, Arc::clone(&sample));
                Some(sample)
            }
            Err(e) => {
                log::warn!("failed to load sample {}: {}", symbol, e);
                None
            }
        }
    }
}
