use mp2k::export::{export_to_wav, ExportConfig};
use mp2k::player::{Mp2kPlayer, SeqEvent, TimedEvent};
use mp2k::Mp2kSynth;
use std::env;
use std::sync::Arc;

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// A short built-in sequence exercising the selected program: an arpeggio,
/// a vibrato-modulated held note, and a pitch-bent tail.
fn demo_sequence(program: i32) -> Vec<TimedEvent> {
    let mut events = Vec::new();
    let mut push = |time_secs: f64, event: SeqEvent| events.push(TimedEvent { time_secs, event });

    push(0.0, SeqEvent::ProgramChange { program, channel: 0 });
    push(0.0, SeqEvent::ControlChange { controller: 7, value: 110, channel: 0 });

    for (i, note) in [60, 64, 67, 72].into_iter().enumerate() {
        let t = i as f64 * 0.3;
        push(t, SeqEvent::NoteOn { note, velocity: 100, channel: 0 });
        push(t + 0.25, SeqEvent::NoteOff { note, channel: 0 });
    }

    // Held note with vibrato
    push(1.3, SeqEvent::ControlChange { controller: 21, value: 44, channel: 0 });
    push(1.3, SeqEvent::ControlChange { controller: 1, value: 40, channel: 0 });
    push(1.3, SeqEvent::NoteOn { note: 67, velocity: 108, channel: 0 });
    push(2.5, SeqEvent::NoteOff { note: 67, channel: 0 });

    // Bend up a whole tone and back
    push(2.6, SeqEvent::ControlChange { controller: 1, value: 0, channel: 0 });
    push(2.6, SeqEvent::NoteOn { note: 60, velocity: 108, channel: 0 });
    push(3.0, SeqEvent::PitchBend { value: 8191, channel: 0 });
    push(3.4, SeqEvent::PitchBend { value: 0, channel: 0 });
    push(3.8, SeqEvent::NoteOff { note: 60, channel: 0 });

    events
}

fn print_usage() {
    eprintln!(
        "Usage:\n  mp2k [--voicegroup N] [--program N] [--rate HZ] [--export FILE] <project_dir>\n\n\
         Flags:\n  --voicegroup N   Voicegroup number to load (default 0)\n  \
         --program N      Program to play in the demo sequence (default 0)\n  \
         --rate HZ        Output sample rate (default {})\n  \
         --export FILE    Render the demo sequence to a WAV file instead of playing\n  \
         -h, --help       Show this help\n\nExamples:\n  \
         mp2k --voicegroup 42 ~/pokeemerald\n  \
         mp2k --voicegroup 42 --export demo.wav ~/pokeemerald",
        DEFAULT_SAMPLE_RATE
    );
}

#[cfg(feature = "streaming")]
fn play_live(player: &mut Mp2kPlayer, events: &[TimedEvent], sample_rate: u32) -> mp2k::Result<()> {
    use mp2k::{AudioDevice, StreamConfig};
    use std::time::{Duration, Instant};

    let device = AudioDevice::new(Arc::clone(player.synth()), StreamConfig::new(sample_rate))?;
    println!("Audio device initialized - playing to speakers");

    let start = Instant::now();
    for timed in events {
        let target = Duration::from_secs_f64(timed.time_secs);
        let elapsed = start.elapsed();
        if target > elapsed {
            std::thread::sleep(target - elapsed);
        }
        player.handle_event(&timed.event);
    }

    // Let release and echo tails ring out
    std::thread::sleep(Duration::from_secs(1));
    player.stop_all_notes();
    device.finish();
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play_live(
    _player: &mut Mp2kPlayer,
    _events: &[TimedEvent],
    _sample_rate: u32,
) -> mp2k::Result<()> {
    Err("live playback requires the \"streaming\" feature; rebuild with \
         `--features streaming`, or use --export"
        .into())
}

fn run() -> mp2k::Result<()> {
    let mut voicegroup_num: u32 = 0;
    let mut program: i32 = 0;
    let mut sample_rate = DEFAULT_SAMPLE_RATE;
    let mut export_path: Option<String> = None;
    let mut project_dir: Option<String> = None;
    let mut show_help = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => show_help = true,
            "--voicegroup" => match args.next().and_then(|v| v.parse().ok()) {
                Some(n) => voicegroup_num = n,
                None => {
                    eprintln!("--voicegroup requires a number");
                    show_help = true;
                }
            },
            "--program" => match args.next().and_then(|v| v.parse().ok()) {
                Some(n) => program = n,
                None => {
                    eprintln!("--program requires a number");
                    show_help = true;
                }
            },
            "--rate" => match args.next().and_then(|v| v.parse().ok()) {
                Some(n) => sample_rate = n,
                None => {
                    eprintln!("--rate requires a sample rate in Hz");
                    show_help = true;
                }
            },
            "--export" => match args.next() {
                Some(path) => export_path = Some(path),
                None => {
                    eprintln!("--export requires a file path");
                    show_help = true;
                }
            },
            _ if arg.starts_with('-') => {
                eprintln!("Unknown flag: {}", arg);
                show_help = true;
            }
            _ => project_dir = Some(arg),
        }
    }

    let Some(project_dir) = project_dir else {
        print_usage();
        return Ok(());
    };
    if show_help {
        print_usage();
        return Ok(());
    }

    println!("M4A Voicegroup Synthesizer");
    println!("==========================\n");

    let synth = Arc::new(Mp2kSynth::new(sample_rate));
    let mut player = Mp2kPlayer::new(project_dir.as_str(), Arc::clone(&synth));
    player.load_voicegroup(voicegroup_num)?;

    let voices = player
        .voicegroup()
        .map(|g| g.voices.len())
        .unwrap_or(0);
    println!("Loaded voicegroup{:03} ({} voices)", voicegroup_num, voices);
    println!("Sample rate: {} Hz\n", sample_rate);

    let events = demo_sequence(program);

    match export_path {
        Some(path) => {
            println!("Rendering demo sequence to {}...", path);
            let config = ExportConfig {
                sample_rate,
                tail_secs: 1.0,
            };
            export_to_wav(&mut player, &events, &path, config)?;
            println!("Export complete.");
        }
        None => {
            play_live(&mut player, &events, sample_rate)?;
            println!("Playback complete.");
        }
    }

    Ok(())
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
