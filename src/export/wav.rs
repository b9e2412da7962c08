//! WAV file export

use super::{render_sequence, ExportConfig};
use crate::player::{Mp2kPlayer, TimedEvent};
use crate::{Mp2kError, Result};
use std::path::Path;

/// Render a timed sequence offline and write it as 16-bit stereo WAV.
///
/// # Examples
///
/// ```no_run
/// use mp2k::export::{export_to_wav, ExportConfig};
/// use mp2k::player::{SeqEvent, TimedEvent};
/// use mp2k::{Mp2kPlayer, Mp2kSynth};
/// use std::sync::Arc;
///
/// # fn main() -> mp2k::Result<()> {
/// let synth = Arc::new(Mp2kSynth::new(44_100));
/// let mut player = Mp2kPlayer::new("project", Arc::clone(&synth));
/// player.load_voicegroup(0)?;
/// let events = vec![
///     TimedEvent { time_secs: 0.0, event: SeqEvent::NoteOn { note: 60, velocity: 112, channel: 0 } },
///     TimedEvent { time_secs: 1.0, event: SeqEvent::NoteOff { note: 60, channel: 0 } },
/// ];
/// export_to_wav(&mut player, &events, "out.wav", ExportConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub fn export_to_wav<P: AsRef<Path>>(
    player: &mut Mp2kPlayer,
    events: &[TimedEvent],
    output_path: P,
    config: ExportConfig,
) -> Result<()> {
    let samples = render_sequence(player, events, config);
    write_wav_file(output_path.as_ref(), &samples, config.sample_rate)
}

fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Mp2kError::AudioFileError(format!("{}: {}", path.display(), e)))?;

    for &s in samples {
        let sample = (s.clamp(-1.0, 1.0) * 32_767.0) as i16;
        writer
            .write_sample(sample)
            .map_err(|e| Mp2kError::AudioFileError(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| Mp2kError::AudioFileError(e.to_string()))?;

    log::info!(
        "wrote {} ({} frames at {} Hz)",
        path.display(),
        samples.len() / 2,
        sample_rate
    );
    Ok(())
}
