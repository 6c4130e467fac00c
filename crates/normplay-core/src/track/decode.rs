//! Whole-file decoding with symphonia
//!
//! Files are decoded completely into memory before a track is built;
//! there is no progressive decode.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::loudness::LoudnessError;
use crate::types::InterleavedBuffer;

/// Reasons a file cannot become a track
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,

    #[error("File decoded to zero frames")]
    Empty,

    #[error("Unusable audio: {0}")]
    Loudness(#[from] LoudnessError),
}

/// Decoded file contents
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub buffer: InterleavedBuffer,
    pub sample_rate: u32,
}

/// Decode an entire audio file into interleaved f32 samples
///
/// Corrupt packets are skipped with a warning; reading stops at the end of
/// the stream.
pub fn decode(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("{}: error reading packet: {}", path.display(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("{}: error decoding packet: {}", path.display(), e);
                continue;
            }
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        if channels == 0 {
            channels = spec.channels.count();
        }

        // Packets may grow (e.g. VBR streams), so reallocate when they outgrow the buffer
        let needed = decoded.capacity() as u64;
        if sample_buf.as_ref().map_or(true, |b| (b.capacity() as u64) < needed * spec.channels.count() as u64) {
            sample_buf = Some(SampleBuffer::new(needed, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let sample_rate = sample_rate.filter(|&r| r > 0).ok_or(DecodeError::UnknownSampleRate)?;
    let buffer = InterleavedBuffer::from_interleaved(samples, channels);
    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "Decoded {}: {} frames, {} ch @ {}Hz",
        path.display(),
        buffer.frames(),
        buffer.channels(),
        sample_rate
    );

    Ok(DecodedAudio { buffer, sample_rate })
}
