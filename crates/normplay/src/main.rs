//! Normplay - loudness-normalizing audio player
//!
//! Headless front end over `normplay-core`. It:
//! 1. Decodes and measures the files given on the command line
//! 2. Plays the first one on the configured output device
//! 3. Takes commands on stdin and polls the engine between them
//!
//! ## Command line flags
//!
//! - `--mode raw|mixing|mastering`: starting loudness mode
//! - `--device NAME`: output device, as printed by `--list-devices`
//! - `--buffer FRAMES`: fixed output period size
//! - `--config PATH`: config file instead of the default location
//! - `--list-devices`: print output devices and exit

mod cli;
mod command;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use normplay_core::audio::{list_output_devices, AudioBackend, DeviceId, OutputDevice};
use normplay_core::config::{default_config_path, load_config, EngineConfig};
use normplay_core::engine::{DeviceOutcome, PlaybackEngine, SelectOutcome};
use normplay_core::PlayState;

use cli::{CliArgs, USAGE};
use command::{Command, HELP};

/// How often the engine is polled for end-of-track
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("normplay: {}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    if args.help {
        println!("{}\n\n{}", USAGE, HELP);
        return Ok(());
    }
    if args.list_devices {
        print_devices(&list_output_devices()?);
        return Ok(());
    }

    rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("normplay-load-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config: EngineConfig = load_config(&config_path);
    if let Some(mode) = args.mode {
        config.playback.default_mode = mode;
    }
    config.audio = args.apply_audio(config.audio);

    let mut engine = PlaybackEngine::new(config).context("Failed to initialize audio output")?;

    let report = engine.load_files(&args.files);
    for (path, err) in &report.failed {
        eprintln!("skipped {}: {}", path.display(), err);
    }
    if report.loaded == 0 {
        bail!("none of the {} files could be loaded", args.files.len());
    }

    engine.select_track(0)?;
    print_tracks(&engine);
    engine.play()?;
    print_status(&engine);

    run(&mut engine, spawn_stdin_reader())?;

    engine.stop()?;
    log::info!("normplay stopped");
    Ok(())
}

/// Command loop; returns on `quit`, or at end of track once stdin is closed
fn run<B: AudioBackend>(engine: &mut PlaybackEngine<B>, lines: Receiver<String>) -> Result<()> {
    let mut input = Some(lines);

    loop {
        let received = input.as_ref().map(|rx| rx.recv_timeout(POLL_INTERVAL));
        match received {
            Some(Ok(line)) => match line.parse::<Command>() {
                Ok(Command::Quit) => return Ok(()),
                Ok(command) => {
                    if let Err(e) = execute(engine, command) {
                        eprintln!("error: {:#}", e);
                    }
                }
                Err(e) => eprintln!("{:#}", e),
            },
            Some(Err(RecvTimeoutError::Timeout)) => {}
            Some(Err(RecvTimeoutError::Disconnected)) => {
                log::info!("stdin closed, playing to the end of the track");
                input = None;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }

        if engine.poll() {
            println!("end of track");
            if input.is_none() {
                return Ok(());
            }
        } else if input.is_none() && engine.state() != PlayState::Playing {
            return Ok(());
        }
    }
}

fn execute<B: AudioBackend>(engine: &mut PlaybackEngine<B>, command: Command) -> Result<()> {
    match command {
        Command::Play => engine.play()?,
        Command::Pause => engine.pause()?,
        Command::Stop => engine.stop()?,
        Command::Seek(ratio) => engine.seek(ratio)?,
        Command::Mode(mode) => engine.set_loudness_mode(mode),
        Command::Track(index) => {
            if engine.select_track(index)? == SelectOutcome::Unchanged {
                println!("track {} is already selected", index + 1);
            }
        }
        Command::Remove(index) => {
            let track = engine.remove_track(index)?;
            println!("removed {}", track.name());
            print_tracks(engine);
        }
        Command::Device(name) => match engine.set_output_device(DeviceId::new(name))? {
            DeviceOutcome::Switched => println!("output: {}", engine.output_device()),
            DeviceOutcome::Unchanged => println!("already on {}", engine.output_device()),
        },
        Command::List => print_tracks(engine),
        Command::Devices => print_devices(&engine.output_devices()?),
        Command::Help => println!("{}", HELP),
        Command::Status | Command::Quit => {}
    }
    print_status(engine);
    Ok(())
}

/// Forward stdin lines to the control loop
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("normplay-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        // Dropping the sender side makes the loop behave as if stdin closed
        log::warn!("Could not read stdin: {}", e);
    }
    rx
}

fn print_tracks<B: AudioBackend>(engine: &PlaybackEngine<B>) {
    let active = engine.active_track_index();
    for (i, line) in engine.track_display_strings().iter().enumerate() {
        let marker = if active == Some(i) { '>' } else { ' ' };
        println!("{}{:>3}. {}", marker, i + 1, line);
    }
}

fn print_status<B: AudioBackend>(engine: &PlaybackEngine<B>) {
    let Some(track) = engine.active_track() else {
        println!("[{:?}] no track selected", engine.state());
        return;
    };
    println!(
        "[{:?}] {:<9} {} / {} ({:.0}%)  {}{}",
        engine.state(),
        engine.loudness_mode().name(),
        format_time(engine.current_playhead_secs()),
        format_time(track.length_secs()),
        engine.current_playhead_ratio() * 100.0,
        track.name(),
        if engine.is_clipping() { "  [clipping]" } else { "" }
    );
}

fn print_devices(devices: &[OutputDevice]) {
    for device in devices {
        println!("  {}  ({} ch, {:?} Hz)", device, device.max_channels, device.sample_rates);
    }
}

fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    format!("{:02}:{:04.1}", (secs / 60.0).floor() as u64, secs % 60.0)
}
