//! Camera session lifecycle.
//!
//! `idle -> requesting -> active | error`, `error -> requesting` on retry,
//! anything `-> idle` on disable or teardown. At most one live stream exists
//! and it belongs to the session while it is `active`.

use crate::error::CameraError;
use async_trait::async_trait;
use colored::*;
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Latest decoded frame of a live stream, the thing overlays and the
/// transmission loop read from.
#[derive(Debug, Clone)]
pub struct VideoSurface {
    id: u64,
    frames: watch::Receiver<Option<Arc<RgbImage>>>,
}

impl VideoSurface {
    pub fn channel() -> (watch::Sender<Option<Arc<RgbImage>>>, VideoSurface) {
        let (tx, rx) = watch::channel(None);
        let id = NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed);
        (tx, VideoSurface { id, frames: rx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The current frame, or `None` while nothing with real dimensions has been decoded.
    pub fn current(&self) -> Option<Arc<RgbImage>> {
        self.frames
            .borrow()
            .as_ref()
            .filter(|f| f.width() > 0 && f.height() > 0)
            .cloned()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current().map(|f| f.dimensions())
    }
}

/// An acquired device stream. `stop` consumes it, so tracks are released once.
pub trait MediaStream: Send {
    fn surface(&self) -> VideoSurface;
    fn label(&self) -> String;
    fn stop(self: Box<Self>);
}

#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>, CameraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Requesting,
    Active,
    Error,
}

type Acquisition = JoinHandle<Result<Box<dyn MediaStream>, CameraError>>;

pub struct CameraSession {
    source: Arc<dyn StreamSource>,
    state: CameraState,
    error_message: Option<String>,
    stream: Option<Box<dyn MediaStream>>,
    pending: Option<Acquisition>,
}

impl CameraSession {
    pub fn new(source: Arc<dyn StreamSource>) -> Self {
        Self {
            source,
            state: CameraState::Idle,
            error_message: None,
            stream: None,
            pending: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.state == CameraState::Active
    }

    pub fn surface(&self) -> Option<VideoSurface> {
        match (self.state, &self.stream) {
            (CameraState::Active, Some(stream)) => Some(stream.surface()),
            _ => None,
        }
    }

    /// Starts acquisition. A no-op while already requesting or active.
    pub fn enable(&mut self) -> bool {
        if matches!(self.state, CameraState::Requesting | CameraState::Active) {
            return false;
        }
        self.state = CameraState::Requesting;
        self.error_message = None;
        let source = Arc::clone(&self.source);
        self.pending = Some(tokio::spawn(async move { source.acquire().await }));
        true
    }

    pub fn retry(&mut self) -> bool {
        self.state == CameraState::Error && self.enable()
    }

    /// Waits for the in-flight acquisition and applies it. Pends forever when
    /// nothing is in flight, so it can sit in a `select!`.
    pub async fn settle(&mut self) -> CameraState {
        let joined = match self.pending.as_mut() {
            Some(task) => task.await,
            None => std::future::pending().await,
        };
        self.pending = None;
        let result = joined.unwrap_or_else(|e| Err(CameraError::Device(e.to_string())));
        self.complete(result);
        self.state
    }

    fn complete(&mut self, result: Result<Box<dyn MediaStream>, CameraError>) {
        match result {
            Ok(stream) if self.state == CameraState::Requesting => {
                info!(device = %stream.label(), "camera stream active");
                self.stream = Some(stream);
                self.state = CameraState::Active;
            }
            Ok(stream) => stream.stop(),
            Err(err) => {
                warn!(%err, "camera acquisition failed");
                self.error_message = Some(err.to_string());
                self.state = CameraState::Error;
            }
        }
    }

    /// Returns to `idle`, stopping the live stream and abandoning any acquisition.
    pub fn disable(&mut self) {
        self.reap_pending();
        if let Some(stream) = self.stream.take() {
            debug!(device = %stream.label(), "stopping camera stream");
            stream.stop();
        }
        self.state = CameraState::Idle;
        self.error_message = None;
    }

    // A stream granted after the session stopped waiting still has to be released.
    fn reap_pending(&mut self) {
        let Some(task) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Ok(Ok(stream)) = task.await {
                        debug!(device = %stream.label(), "releasing late camera stream");
                        stream.stop();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Device camera via nokhwa. Each acquisition owns a capture thread that
/// opens the device, reports readiness and then publishes decoded frames.
pub struct NokhwaSource {
    index: u32,
}

impl NokhwaSource {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[async_trait]
impl StreamSource for NokhwaSource {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>, CameraError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (frames, surface) = VideoSurface::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let index = self.index;

        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_loop(index, ready_tx, frames, stop_flag))
            .map_err(|e| CameraError::Device(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(label)) => Ok(Box::new(NokhwaStream { label, surface, stop })),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CameraError::Device("capture thread exited".to_string())),
        }
    }
}

struct NokhwaStream {
    label: String,
    surface: VideoSurface,
    stop: Arc<AtomicBool>,
}

impl MediaStream for NokhwaStream {
    fn surface(&self) -> VideoSurface {
        self.surface.clone()
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn stop(self: Box<Self>) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn open_camera(index: u32) -> Result<Camera, CameraError> {
    let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| CameraError::from_backend(e.to_string()))?;
    if devices.is_empty() {
        return Err(CameraError::NoDevice);
    }

    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .map_err(|e| CameraError::from_backend(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| CameraError::from_backend(e.to_string()))?;

    println!("{}", format!("Opened camera: {}", camera.info().human_name()).green());
    println!("Format: {}", camera.camera_format());
    Ok(camera)
}

fn decode_frame(camera: &mut Camera) -> Option<RgbImage> {
    let frame = camera.frame().map_err(|e| debug!("frame grab failed: {e}")).ok()?;
    let decoded = frame
        .decode_image::<RgbFormat>()
        .map_err(|e| debug!("frame decode failed: {e}"))
        .ok()?;
    let (width, height) = (decoded.width(), decoded.height());
    RgbImage::from_raw(width, height, decoded.into_raw())
}

fn capture_loop(
    index: u32,
    ready: oneshot::Sender<Result<String, CameraError>>,
    frames: watch::Sender<Option<Arc<RgbImage>>>,
    stop: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    if ready.send(Ok(camera.info().human_name())).is_err() {
        // nobody is waiting for this stream any more
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::Acquire) {
        match decode_frame(&mut camera) {
            Some(frame) => {
                frames.send_replace(Some(Arc::new(frame)));
            }
            None => thread::sleep(Duration::from_millis(10)),
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("failed to stop camera stream: {e}");
    }
    frames.send_replace(None);
    info!("camera {} released", index);
}

/// Prints the devices nokhwa can see.
pub fn list_cameras() -> anyhow::Result<()> {
    let cameras = nokhwa::query(ApiBackend::Auto)?;
    println!("Available Cameras:");
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {:?}", cam.index(), cam.human_name(), cam.misc());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scripted source: each acquisition pops the next outcome after `delay`.
    pub struct FakeSource {
        outcomes: Mutex<VecDeque<Result<(), CameraError>>>,
        delay: Duration,
        pub acquired: AtomicUsize,
        pub stops: Arc<AtomicUsize>,
        pub frames: Mutex<Vec<watch::Sender<Option<Arc<RgbImage>>>>>,
    }

    impl FakeSource {
        pub fn new(outcomes: Vec<Result<(), CameraError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                delay,
                acquired: AtomicUsize::new(0),
                stops: Arc::new(AtomicUsize::new(0)),
                frames: Mutex::new(Vec::new()),
            })
        }

        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        /// Publishes a frame on the most recently acquired stream.
        pub fn push_frame(&self, frame: RgbImage) {
            if let Some(tx) = self.frames.lock().unwrap().last() {
                tx.send_replace(Some(Arc::new(frame)));
            }
        }
    }

    pub struct FakeStream {
        surface: VideoSurface,
        stops: Arc<AtomicUsize>,
    }

    impl MediaStream for FakeStream {
        fn surface(&self) -> VideoSurface {
            self.surface.clone()
        }

        fn label(&self) -> String {
            "fake".to_string()
        }

        fn stop(self: Box<Self>) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StreamSource for FakeSource {
        async fn acquire(&self) -> Result<Box<dyn MediaStream>, CameraError> {
            tokio::time::sleep(self.delay).await;
            let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
            outcome?;
            self.acquired.fetch_add(1, Ordering::SeqCst);
            let (tx, surface) = VideoSurface::channel();
            self.frames.lock().unwrap().push(tx);
            Ok(Box::new(FakeStream { surface, stops: Arc::clone(&self.stops) }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;

    const GRANT: Duration = Duration::from_millis(50);

    #[tokio::test(start_paused = true)]
    async fn enable_settles_to_active() {
        let source = FakeSource::new(vec![Ok(())], GRANT);
        let mut session = CameraSession::new(source.clone());

        assert!(session.enable());
        assert_eq!(session.state(), CameraState::Requesting);
        assert_eq!(session.settle().await, CameraState::Active);
        assert!(session.surface().is_some());
        assert_eq!(source.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn denial_settles_to_error_with_cause() {
        let source = FakeSource::new(
            vec![Err(CameraError::PermissionDenied("Permission denied".into()))],
            GRANT,
        );
        let mut session = CameraSession::new(source.clone());
        session.enable();

        assert_eq!(session.settle().await, CameraState::Error);
        assert_eq!(session.error_message(), Some("Camera access denied: Permission denied"));
        assert!(session.surface().is_none());

        assert!(session.retry());
        assert_eq!(session.state(), CameraState::Requesting);
        assert_eq!(session.error_message(), None);
        assert_eq!(session.settle().await, CameraState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn enable_is_a_no_op_while_requesting_or_active() {
        let source = FakeSource::new(vec![], GRANT);
        let mut session = CameraSession::new(source.clone());
        assert!(session.enable());
        assert!(!session.enable());
        session.settle().await;
        assert!(!session.enable());
        assert!(!session.retry());
        assert_eq!(source.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_stream_exactly_once() {
        let source = FakeSource::new(vec![], GRANT);
        let mut session = CameraSession::new(source.clone());
        session.enable();
        session.settle().await;

        session.disable();
        assert_eq!(session.state(), CameraState::Idle);
        assert_eq!(source.stop_count(), 1);

        session.disable();
        drop(session);
        assert_eq!(source.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_while_requesting_releases_late_stream() {
        let source = FakeSource::new(vec![], GRANT);
        let mut session = CameraSession::new(source.clone());
        session.enable();
        drop(session);

        tokio::time::sleep(GRANT * 2).await;
        assert_eq!(source.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(source.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_stream_stopped_once_across_cycles() {
        let source = FakeSource::new(vec![], GRANT);
        let mut session = CameraSession::new(source.clone());
        for _ in 0..3 {
            session.enable();
            session.settle().await;
            assert_eq!(source.stop_count(), source.acquired.load(Ordering::SeqCst) - 1);
            session.disable();
        }
        assert_eq!(source.stop_count(), 3);
    }

    #[test]
    fn backend_messages_are_classified() {
        assert!(matches!(
            CameraError::from_backend("Permission Denied by user"),
            CameraError::PermissionDenied(_)
        ));
        assert_eq!(CameraError::from_backend("device not found"), CameraError::NoDevice);
        assert!(matches!(CameraError::from_backend("busy"), CameraError::Device(_)));
    }

    #[tokio::test]
    async fn surface_hides_empty_frames() {
        let (tx, surface) = VideoSurface::channel();
        assert!(surface.current().is_none());
        tx.send_replace(Some(Arc::new(RgbImage::new(0, 0))));
        assert!(surface.dimensions().is_none());
        tx.send_replace(Some(Arc::new(RgbImage::new(4, 3))));
        assert_eq!(surface.dimensions(), Some((4, 3)));
    }
}
