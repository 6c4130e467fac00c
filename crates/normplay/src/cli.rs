//! Command-line flags

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use normplay_core::audio::{AudioConfig, DeviceId};
use normplay_core::LoudnessMode;

pub const USAGE: &str = "\
usage: normplay [--mode raw|mixing|mastering] [--device NAME] [--buffer FRAMES]
                [--config PATH] FILE...
       normplay --list-devices";

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub mode: Option<LoudnessMode>,
    pub device: Option<String>,
    /// Fixed period size in frames
    pub buffer: Option<u32>,
    pub config: Option<PathBuf>,
    pub list_devices: bool,
    pub help: bool,
    pub files: Vec<PathBuf>,
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mode" | "-m" => {
                    let value = args.next().context("--mode needs a value")?;
                    parsed.mode = Some(value.parse()?);
                }
                "--device" | "-d" => {
                    parsed.device = Some(args.next().context("--device needs a name")?);
                }
                "--buffer" | "-b" => {
                    let value = args.next().context("--buffer needs a frame count")?;
                    let frames: u32 = value
                        .parse()
                        .with_context(|| format!("'{}' is not a frame count", value))?;
                    if frames == 0 {
                        bail!("--buffer must be at least 1 frame");
                    }
                    parsed.buffer = Some(frames);
                }
                "--config" | "-c" => {
                    parsed.config = Some(args.next().context("--config needs a path")?.into());
                }
                "--list-devices" => parsed.list_devices = true,
                "--help" | "-h" => parsed.help = true,
                "--" => parsed.files.extend(args.by_ref().map(PathBuf::from)),
                flag if flag.starts_with('-') && flag.len() > 1 => bail!("unknown flag {}", flag),
                _ => parsed.files.push(PathBuf::from(arg)),
            }
        }

        if parsed.files.is_empty() && !parsed.list_devices && !parsed.help {
            bail!("no input files");
        }
        Ok(parsed)
    }

    /// Layer the output flags over the loaded audio settings
    pub fn apply_audio(&self, mut audio: AudioConfig) -> AudioConfig {
        if let Some(name) = &self.device {
            audio = audio.with_output_device(DeviceId::new(name));
        }
        if let Some(frames) = self.buffer {
            audio = audio.with_buffer_frames(frames);
        }
        audio
    }
}
