//! Periodic frame transmission to the perception service.

use crate::camera::VideoSurface;
use crate::periodic::PeriodicTask;
use crate::streaming::channel::{EncodedFrame, FrameSink, SendOutcome};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TICK: Duration = Duration::from_millis(150);
// Quality 50 is plenty for pose and skin sampling and keeps frames small
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

/// Copies the live frame into a reusable raster and JPEG-encodes it.
pub struct FrameSampler {
    raster: RgbImage,
    quality: u8,
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self { raster: RgbImage::new(0, 0), quality: quality.clamp(1, 100) }
    }

    pub fn raster_dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// `None` while the surface has no decoded frame yet.
    pub fn sample(&mut self, surface: &VideoSurface) -> Option<EncodedFrame> {
        let frame = surface.current()?;
        let (width, height) = frame.dimensions();
        if self.raster.dimensions() != (width, height) {
            self.raster = RgbImage::new(width, height);
        }
        self.raster.copy_from_slice(frame.as_raw());

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        if let Err(e) = self.raster.write_with_encoder(encoder) {
            debug!("frame encode failed: {e}");
            return None;
        }
        Some(EncodedFrame { jpeg, width, height })
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub sent: u64,
    /// Frames encoded but not sent because the channel was busy or closed.
    pub dropped: u64,
    /// Ticks with no decoded video to sample.
    pub skipped: u64,
}

/// What the loop depends on. It only runs when all three are present.
#[derive(Debug, Clone, Default)]
pub struct TransmitConditions {
    pub surface: Option<VideoSurface>,
    pub scanning: bool,
    pub sink: Option<FrameSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopKey {
    surface: u64,
    sink: u64,
}

impl TransmitConditions {
    fn key(&self) -> Option<LoopKey> {
        match (&self.surface, self.scanning, &self.sink) {
            (Some(surface), true, Some(sink)) if sink.is_open() => Some(LoopKey {
                surface: surface.id(),
                sink: sink.id(),
            }),
            _ => None,
        }
    }
}

pub struct TransmitLoop {
    period: Duration,
    quality: u8,
    running: Option<(LoopKey, PeriodicTask)>,
    counters: Arc<Counters>,
}

impl TransmitLoop {
    pub fn new(period: Duration, quality: u8) -> Self {
        Self {
            period,
            quality,
            running: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stats(&self) -> TransmitStats {
        TransmitStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Tears the timer down whenever the conditions change and starts a fresh
    /// one if they all hold. Unchanged conditions leave the running timer alone.
    pub fn reconcile(&mut self, conditions: &TransmitConditions) {
        let key = conditions.key();
        if self.running.as_ref().map(|(k, _)| *k) == key {
            return;
        }
        self.stop();

        let (Some(key), Some(surface), Some(sink)) = (key, conditions.surface.clone(), conditions.sink.clone()) else {
            return;
        };

        info!(surface = key.surface, channel = key.sink, "frame transmission started");
        let mut sampler = FrameSampler::new(self.quality);
        let counters = Arc::clone(&self.counters);
        let task = PeriodicTask::spawn(self.period, move || {
            let Some(frame) = sampler.sample(&surface) else {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            };
            match sink.try_send(frame) {
                SendOutcome::Sent => counters.sent.fetch_add(1, Ordering::Relaxed),
                SendOutcome::Busy | SendOutcome::Closed => counters.dropped.fetch_add(1, Ordering::Relaxed),
            };
        });
        self.running = Some((key, task));
    }

    pub fn stop(&mut self) {
        if let Some((key, task)) = self.running.take() {
            task.cancel();
            debug!(surface = key.surface, channel = key.sink, "frame transmission stopped");
        }
    }
}

impl Drop for TransmitLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
