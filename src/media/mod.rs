//! # Media Source
//!
//! Turns the configured local audio asset into outbound session audio.
//!
//! ## Key Components:
//! - **MediaSource**: knows where the asset may live (primary file, then
//!   fallback). Shared by all sessions, holds no decode state.
//! - **MediaStream**: one decode stream over the asset, looping forever.
//!   Every session opens its own, so playback positions are independent.
//! - **AudioTrack**: the outbound track a stream is turned into.
//!
//! ## Output Format:
//! - **Codec**: G.711 mu-law (PCMU)
//! - **Sample Rate**: 8 kHz, mono
//! - **Framing**: `media.frame_duration_ms` per RTP sample (20 ms default)

pub mod codec;
pub mod track;

use crate::config::MediaConfig;
use crate::error::MediaError;
use codec::{samples_per_frame, FrameEncoder, PCMU_CHANNELS, PCMU_SAMPLE_RATE};
use rodio::decoder::LoopedDecoder;
use rodio::source::UniformSourceIterator;
use rodio::Decoder;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use track::AudioTrack;

#[derive(Debug, Clone)]
pub struct MediaSource {
    candidates: Vec<PathBuf>,
    frame_duration: Duration,
}

impl MediaSource {
    pub fn new(candidates: Vec<PathBuf>, frame_duration: Duration) -> Self {
        Self {
            candidates,
            frame_duration,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.candidates(), config.frame_duration())
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists on disk.
    pub fn resolve(&self) -> Result<PathBuf, MediaError> {
        self.candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| MediaError::NotFound {
                tried: self.candidates.clone(),
            })
    }

    /// Opens a fresh, independently positioned decode stream.
    pub fn open(&self) -> Result<MediaStream, MediaError> {
        let path = self.resolve()?;
        let file = File::open(&path).map_err(|source| MediaError::Io {
            path: path.clone(),
            source,
        })?;
        let decoder = Decoder::new_looped(BufReader::new(file)).map_err(|err| MediaError::Decode {
            path: path.clone(),
            message: err.to_string(),
        })?;

        Ok(MediaStream {
            path,
            decoder,
            frame_duration: self.frame_duration,
        })
    }
}

/// A decodable stream over the asset that restarts at end of file.
pub struct MediaStream {
    path: PathBuf,
    decoder: LoopedDecoder<BufReader<File>>,
    frame_duration: Duration,
}

impl MediaStream {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Converts the stream into a live outbound audio track. The decoder
    /// moves into the track's pump, so each stream backs exactly one track.
    pub fn into_audio_track(self, stream_id: &str) -> Arc<AudioTrack> {
        let pcm = UniformSourceIterator::<_, i16>::new(self.decoder, PCMU_CHANNELS, PCMU_SAMPLE_RATE);
        let frames = FrameEncoder::new(pcm, samples_per_frame(self.frame_duration));
        AudioTrack::start(stream_id, self.path, frames, self.frame_duration)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("path", &self.path)
            .field("frame_duration", &self.frame_duration)
            .finish()
    }
}
