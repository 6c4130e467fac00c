//! Interactive commands read from stdin

use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use normplay_core::LoudnessMode;

pub const HELP: &str = "\
commands:
  play | pause | stop
  seek <0..1>          jump to a fraction of the track
  mode <raw|mixing|mastering>
  track <n>            select track n (as listed)
  remove <n>           remove track n
  device <name>        switch output device
  list | devices | status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Mode(LoudnessMode),
    /// Zero-based index into the track list
    Track(usize),
    /// Zero-based index into the track list
    Remove(usize),
    Device(String),
    List,
    Devices,
    Status,
    Help,
    Quit,
}

/// Parse a 1-based track number into an index
fn track_number(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg.parse().with_context(|| format!("'{}' is not a track number", arg))?;
    n.checked_sub(1).ok_or_else(|| anyhow!("tracks are numbered from 1"))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let needs_arg = |what: &str| {
            if rest.is_empty() {
                Err(anyhow!("{} needs {}", word, what))
            } else {
                Ok(rest)
            }
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "play" | "p" => Command::Play,
            "pause" => Command::Pause,
            "stop" | "s" => Command::Stop,
            "seek" => {
                let arg = needs_arg("a position")?;
                let ratio: f64 = arg.parse().with_context(|| format!("'{}' is not a number", arg))?;
                if !(0.0..=1.0).contains(&ratio) {
                    bail!("seek position must be between 0 and 1");
                }
                Command::Seek(ratio)
            }
            "mode" | "m" => Command::Mode(needs_arg("a mode")?.parse()?),
            "track" | "t" => Command::Track(track_number(needs_arg("a track number")?)?),
            "remove" | "rm" => Command::Remove(track_number(needs_arg("a track number")?)?),
            "device" => Command::Device(needs_arg("a device name")?.to_string()),
            "list" | "ls" => Command::List,
            "devices" => Command::Devices,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command '{}' (try help)", other),
        };
        Ok(command)
    }
}
