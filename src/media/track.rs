//! Outbound audio track fed from a looping decode stream.
//!
//! ## Pipeline:
//! 1. **Decode worker** (its own OS thread, outside the runtime's blocking
//!    pool): pulls PCM from the decoder, encodes PCMU frames and queues them
//! 2. **Writer task** (async): paces frames in real time onto the
//!    `TrackLocalStaticSample` the peer connection sends from
//!
//! Stopping the track aborts the writer; the worker notices the closed
//! queue on its next send and exits.

use super::codec::{PCMU_CHANNELS, PCMU_SAMPLE_RATE};
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use webrtc::api::media_engine::MIME_TYPE_PCMU;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Frames buffered between the decode worker and the writer.
const FRAME_QUEUE: usize = 16;

pub struct AudioTrack {
    local: Arc<TrackLocalStaticSample>,
    source: PathBuf,
    writer: Mutex<Option<JoinHandle<()>>>,
    frames_written: Arc<AtomicU64>,
}

impl AudioTrack {
    /// Starts pumping `frames` onto a new PCMU track.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start<F>(stream_id: &str, source: PathBuf, frames: F, frame_duration: Duration) -> Arc<Self>
    where
        F: Iterator<Item = Bytes> + Send + 'static,
    {
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: PCMU_SAMPLE_RATE,
                channels: PCMU_CHANNELS,
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.to_owned(),
        ));

        let (tx, rx) = mpsc::channel::<Bytes>(FRAME_QUEUE);
        let worker_source = source.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("decode-{}", stream_id))
            .spawn(move || {
                for frame in frames {
                    if tx.blocking_send(frame).is_err() {
                        return;
                    }
                }
                warn!(source = %worker_source.display(), "Audio decode stream ended");
            });
        if let Err(err) = spawned {
            warn!(source = %source.display(), "Failed to start audio decode worker: {}", err);
        }

        let frames_written = Arc::new(AtomicU64::new(0));
        let writer = tokio::spawn(write_frames(
            local.clone(),
            rx,
            frame_duration,
            frames_written.clone(),
        ));

        Arc::new(Self {
            local,
            source,
            writer: Mutex::new(Some(writer)),
            frames_written,
        })
    }

    /// The track as the WebRTC stack sees it.
    pub fn local(&self) -> Arc<TrackLocalStaticSample> {
        self.local.clone()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.writer
            .lock()
            .as_ref()
            .map(|writer| !writer.is_finished())
            .unwrap_or(false)
    }

    /// Stops the pump. Calling it again does nothing.
    pub fn stop(&self) {
        if let Some(writer) = self.writer.lock().take() {
            writer.abort();
            debug!(source = %self.source.display(), frames = self.frames_written(), "Audio track stopped");
        }
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn write_frames(
    local: Arc<TrackLocalStaticSample>,
    mut frames: mpsc::Receiver<Bytes>,
    frame_duration: Duration,
    frames_written: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(frame_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while let Some(data) = frames.recv().await {
        ticker.tick().await;
        let sample = Sample {
            data,
            duration: frame_duration,
            ..Default::default()
        };
        if let Err(err) = local.write_sample(&sample).await {
            debug!("Dropping audio frame: {}", err);
        }
        frames_written.fetch_add(1, Ordering::Relaxed);
    }
}
