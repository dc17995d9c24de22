//! Audio decoding using Symphonia.
//!
//! This is the decode collaborator consumed by the spectral analyzer:
//! a file path goes in, interleaved samples and a sample rate come out.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use thiserror::Error;

/// Errors that can occur while decoding a track.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to decode audio: {0}")]
    DecodeError(#[from] symphonia::core::errors::Error),

    #[error("No audio track found in file")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,

    #[error("Audio file contains no samples")]
    Empty,
}

/// Decoded audio.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved audio samples (f32, normalized to -1.0..1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
}

impl AudioData {
    /// Wrap a mono sample buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Duration of the audio in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    /// Convert to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Resample a mono signal with linear interpolation.
///
/// Returns the input unchanged when the rates already match.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

/// Source of decoded audio for a file path.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioData, AudioError>;
}

/// Default decoder backed by Symphonia (WAV, MP3, FLAC, AAC).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<AudioData, AudioError> {
        load_audio(path)
    }
}

/// Load audio from a file path.
///
/// The audio is decoded to interleaved f32 samples normalized to -1.0..1.0.
///
/// # Example
///
/// ```no_run
/// use pulsecast::audio::loader::load_audio;
/// use std::path::Path;
///
/// let audio = load_audio(Path::new("song.mp3")).unwrap();
/// println!("Duration: {:.2}s", audio.duration());
/// ```
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    let mut track = OpenTrack::open(path)?;
    let mut samples = Vec::new();
    let mut channels = track.channels;
    let mut buf: Option<SampleBuffer<f32>> = None;

    while let Some(packet) = track.next_packet()? {
        let decoded = match track.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(err)) => {
                log::debug!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        // The first decoded buffer is authoritative for layout
        let buf = buf.get_or_insert_with(|| {
            channels = decoded.spec().channels.count();
            SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    Ok(AudioData {
        samples,
        sample_rate: track.sample_rate,
        channels: channels.max(1),
    })
}

/// Demuxer and decoder for the first audio track of a file.
struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl OpenTrack {
    fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )?
            .format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoAudioTrack)?;
        let params = &track.codec_params;
        let sample_rate = params.sample_rate.ok_or(AudioError::UnknownSampleRate)?;
        let channels = params.channels.map(|c| c.count()).unwrap_or(2);
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs().make(params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Next packet of our track, or `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>, AudioError> {
        loop {
            match self.format.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => self.decoder.reset(),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
