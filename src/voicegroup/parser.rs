//! Assembler-syntax parsing for voicegroup sources
//!
//! Three line-oriented formats share the `@` comment character: voicegroup
//! files (`voice_*` directives after a `Name::` label), sample index files
//! (`Symbol::` labels followed by `.incbin "path"`), and keysplit tables
//! (`.set Name, . - offset` followed by `.byte` rows).

use super::{GbaVoice, KeysplitTable, Voicegroup, VoiceKind, VoicegroupBank};
use crate::{Mp2kError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drop everything from the `@` comment character onward.
fn strip_comment(line: &str) -> &str {
    match line.find('@') {
        Some(at) => &line[..at],
        None => line,
    }
}

/// Split a comma-separated argument list, trimming each token.
fn split_args(args: &str) -> Vec<&str> {
    args.split(',').map(str::trim).collect()
}

/// Leading-integer parse with atoi semantics: garbage yields 0.
fn parse_int(token: &str) -> i32 {
    let token = token.trim();
    let end = token
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    token[..end].parse().unwrap_or(0)
}

/// Parse a `Symbol:: ... .incbin "relpath"` index file into a symbol → path
/// map. A missing file yields an empty map.
pub(super) fn parse_incbin_index(path: &Path) -> HashMap<String, PathBuf> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_incbin_index_str(&content),
        Err(_) => {
            log::debug!("sample index {} not readable", path.display());
            HashMap::new()
        }
    }
}

fn parse_incbin_index_str(content: &str) -> HashMap<String, PathBuf> {
    let mut paths = HashMap::new();
    let mut current_symbol: Option<&str> = None;

    for line in content.lines() {
        let trimmed = strip_comment(line).trim();

        if let Some(colon) = trimmed.find("::") {
            if !trimmed.contains(".incbin") {
                current_symbol = Some(&trimmed[..colon]);
                continue;
            }
        }

        if let Some(symbol) = current_symbol {
            if trimmed.contains(".incbin") {
                if let Some(rel_path) = quoted_str(trimmed) {
                    paths.insert(symbol.to_string(), PathBuf::from(rel_path));
                }
                current_symbol = None;
            }
        }
    }
    paths
}

/// The first double-quoted substring of a line.
fn quoted_str(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

/// Parse a keysplit tables file into name → 128-byte tables. Each table
/// starts at `.set Name, . - offset` where `offset` is the first MIDI note
/// covered; `.byte` rows fill from there. Unmapped notes stay 0.
pub(super) fn parse_keysplit_tables(path: &Path) -> HashMap<String, KeysplitTable> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_keysplit_tables_str(&content),
        Err(_) => {
            log::debug!("keysplit tables {} not readable", path.display());
            HashMap::new()
        }
    }
}

fn parse_keysplit_tables_str(content: &str) -> HashMap<String, KeysplitTable> {
    let mut tables = HashMap::new();
    let mut current: Option<(String, i32, Vec<u8>)> = None;

    fn flush(
        entry: Option<(String, i32, Vec<u8>)>,
        tables: &mut HashMap<String, KeysplitTable>,
    ) {
        if let Some((name, offset, bytes)) = entry {
            let mut table = [0u8; 128];
            for (i, &b) in bytes.iter().enumerate() {
                let idx = offset + i as i32;
                if (0..128).contains(&idx) {
                    table[idx as usize] = b;
                }
            }
            tables.insert(name, table);
        }
    }

    for line in content.lines() {
        let trimmed = strip_comment(line).trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(".set ") {
            flush(current.take(), &mut tables);
            if let Some((name, offset_part)) = rest.split_once(',') {
                // Offset is written as ". - N"
                let offset = match offset_part.find('-') {
                    Some(dash) => parse_int(&offset_part[dash + 1..]),
                    None => 0,
                };
                current = Some((name.trim().to_string(), offset, Vec::new()));
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(".byte") {
            if let Some((_, _, bytes)) = current.as_mut() {
                bytes.push(parse_int(rest) as u8);
            }
        }
    }

    flush(current.take(), &mut tables);
    tables
}

impl VoicegroupBank {
    /// Parse `sound/voicegroups/<name>.inc` into a voicegroup.
    pub(super) fn parse_voicegroup_file(&mut self, name: &str) -> Result<Voicegroup> {
        let path = self
            .project_dir
            .join("sound/voicegroups")
            .join(format!("{}.inc", name));
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Mp2kError::MissingVoicegroupFile(format!("{}: {}", path.display(), e)))?;

        let mut group = Voicegroup::default();
        let mut past_label = false;

        for line in content.lines() {
            let trimmed = strip_comment(line).trim();
            if trimmed.is_empty() {
                continue;
            }

            if !past_label {
                if trimmed.contains("::") {
                    past_label = true;
                }
                continue;
            }

            if trimmed.starts_with("voice_") {
                group.voices.push(Arc::new(self.parse_voice_line(trimmed)));
            }
        }

        log::debug!("parsed voicegroup {} with {} voices", name, group.voices.len());
        Ok(group)
    }

    /// Parse one `voice_*` directive. Unknown directives and short argument
    /// lists yield the empty voice.
    fn parse_voice_line(&mut self, line: &str) -> GbaVoice {
        let mut voice = GbaVoice::empty();

        let (directive, args) = match line.split_once(char::is_whitespace) {
            Some((directive, args)) => (directive, split_args(args)),
            None => (line, Vec::new()),
        };

        match directive {
            "voice_directsound" | "voice_directsound_alt" | "voice_directsound_no_resample" => {
                // base, pan, sample_symbol, attack, decay, sustain, release
                if args.len() >= 7 {
                    voice.base_midi_key = parse_int(args[0]);
                    voice.pan = parse_int(args[1]);
                    voice.attack = parse_int(args[3]);
                    voice.decay = parse_int(args[4]);
                    voice.sustain = parse_int(args[5]);
                    voice.release = parse_int(args[6]);
                    voice.kind = VoiceKind::DirectSound {
                        symbol: args[2].to_string(),
                        sample: self.resolve_sample(args[2]),
                    };
                }
            }
            "voice_square_1" | "voice_square_1_alt" => {
                // base, pan, sweep, duty, attack, decay, sustain, release
                if args.len() >= 8 {
                    voice.base_midi_key = parse_int(args[0]);
                    voice.pan = parse_int(args[1]);
                    voice.attack = parse_int(args[4]);
                    voice.decay = parse_int(args[5]);
                    voice.sustain = parse_int(args[6]);
                    voice.release = parse_int(args[7]);
                    voice.kind = VoiceKind::Square1 {
                        sweep: parse_int(args[2]),
                        duty_cycle: parse_int(args[3]),
                    };
                }
            }
            "voice_square_2" | "voice_square_2_alt" => {
                // base, pan, duty, attack, decay, sustain, release
                if args.len() >= 7 {
                    voice.base_midi_key = parse_int(args[0]);
                    voice.pan = parse_int(args[1]);
                    voice.attack = parse_int(args[3]);
                    voice.decay = parse_int(args[4]);
                    voice.sustain = parse_int(args[5]);
                    voice.release = parse_int(args[6]);
                    voice.kind = VoiceKind::Square2 {
                        duty_cycle: parse_int(args[2]),
                    };
                }
            }
            "voice_programmable_wave" | "voice_programmable_wave_alt" => {
                // base, pan, wave_symbol, attack, decay, sustain, release
                if args.len() >= 7 {
                    voice.base_midi_key = parse_int(args[0]);
                    voice.pan = parse_int(args[1]);
                    voice.attack = parse_int(args[3]);
                    voice.decay = parse_int(args[4]);
                    voice.sustain = parse_int(args[5]);
                    voice.release = parse_int(args[6]);
                    voice.kind = VoiceKind::ProgWave {
                        symbol: args[2].to_string(),
                        sample: self.resolve_sample(args[2]),
                    };
                }
            }
            "voice_noise" | "voice_noise_alt" => {
                // base, pan, period, attack, decay, sustain, release
                if args.len() >= 7 {
                    voice.base_midi_key = parse_int(args[0]);
                    voice.pan = parse_int(args[1]);
                    voice.attack = parse_int(args[3]);
                    voice.decay = parse_int(args[4]);
                    voice.sustain = parse_int(args[5]);
                    voice.release = parse_int(args[6]);
                    voice.kind = VoiceKind::Noise {
                        period: parse_int(args[2]),
                    };
                }
            }
            "voice_keysplit_all" => {
                if let Some(symbol) = args.first() {
                    voice.kind = VoiceKind::KeysplitAll {
                        sub_voicegroup: symbol.to_string(),
                    };
                }
            }
            "voice_keysplit" => {
                if args.len() >= 2 {
                    voice.kind = VoiceKind::Keysplit {
                        sub_voicegroup: args[0].to_string(),
                        table: args[1].to_string(),
                    };
                }
            }
            _ => {}
        }

        voice
    }
}
