//! Full session against in-process fakes: camera on, frames out, perception
//! update in, overlay and recommendations follow.

use async_trait::async_trait;
use image::{RgbImage, Rgba};
use rusty_mirror::camera::{CameraSession, CameraState, MediaStream, StreamSource, VideoSurface};
use rusty_mirror::dashboard::{Dashboard, DashboardEvent, UserCommand};
use rusty_mirror::error::{CameraError, ChannelError, RecommendError};
use rusty_mirror::overlay::{OverlayInputs, OverlayRenderer, OverlayStyle, Shape};
use rusty_mirror::raster::TextPainter;
use rusty_mirror::recommend::{CompletionOutcome, RecommendationPipeline, RecommendationService};
use rusty_mirror::state::perception_store;
use rusty_mirror::streaming::channel::{spawn_inbound, FrameSink};
use rusty_mirror::streaming::transmit::{TransmitLoop, DEFAULT_JPEG_QUALITY, DEFAULT_TICK};
use rusty_mirror::types::{GarmentRecommendation, RecommendationQuery, RecommendationResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

type FrameCell = watch::Sender<Option<Arc<RgbImage>>>;

#[derive(Default)]
struct Webcam {
    cell: Mutex<Option<FrameCell>>,
    stops: Arc<AtomicUsize>,
}

impl Webcam {
    fn show(&self, frame: RgbImage) {
        if let Some(cell) = self.cell.lock().unwrap().as_ref() {
            cell.send_replace(Some(Arc::new(frame)));
        }
    }
}

struct WebcamStream {
    surface: VideoSurface,
    stops: Arc<AtomicUsize>,
}

impl MediaStream for WebcamStream {
    fn surface(&self) -> VideoSurface {
        self.surface.clone()
    }

    fn label(&self) -> String {
        "test webcam".into()
    }

    fn stop(self: Box<Self>) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamSource for Webcam {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>, CameraError> {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let (cell, surface) = VideoSurface::channel();
        *self.cell.lock().unwrap() = Some(cell);
        Ok(Box::new(WebcamStream { surface, stops: Arc::clone(&self.stops) }))
    }
}

#[derive(Default)]
struct Stylist {
    queries: Mutex<Vec<Option<RecommendationQuery>>>,
}

#[async_trait]
impl RecommendationService for Stylist {
    async fn recommend(&self, query: Option<RecommendationQuery>) -> Result<RecommendationResult, RecommendError> {
        let tone = query.as_ref().map(|q| q.skin_tone.clone()).unwrap_or_default();
        self.queries.lock().unwrap().push(query);
        tokio::time::sleep(Duration::from_millis(25)).await;
        Ok(RecommendationResult {
            garments: vec![GarmentRecommendation {
                id: 4,
                name: format!("Kurta for {tone}"),
                category: "Ethnic".into(),
                color: Some("#800000".into()),
                match_percent: None,
            }],
            palette: Vec::new(),
            body_advice: None,
        })
    }
}

async fn wait_for(dashboard: &mut Dashboard, wanted: impl Fn(&DashboardEvent) -> bool) {
    loop {
        let event = dashboard.next_event().await;
        if wanted(&event) {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn camera_to_overlay_to_recommendations() {
    let webcam = Arc::new(Webcam::default());
    let stylist = Arc::new(Stylist::default());
    let (writer, reader) = perception_store();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<String, ChannelError>>();
    let inbound = spawn_inbound(UnboundedReceiverStream::new(inbound_rx), writer);
    let (sink, mut outbound) = FrameSink::pair();

    let mut dashboard = Dashboard::new(
        CameraSession::new(webcam.clone()),
        reader,
        RecommendationPipeline::new(stylist.clone()),
        OverlayRenderer::new(OverlayStyle::default(), TextPainter::bitmap()),
        TransmitLoop::new(DEFAULT_TICK, DEFAULT_JPEG_QUALITY),
    );
    dashboard.attach_channel(sink);
    dashboard.start();

    // camera on
    dashboard.handle(UserCommand::EnableCamera);
    assert_eq!(dashboard.camera().state(), CameraState::Requesting);
    wait_for(&mut dashboard, |e| *e == DashboardEvent::Camera(CameraState::Active)).await;
    assert!(dashboard.transmit().is_running());

    // frames leave every tick
    webcam.show(RgbImage::from_pixel(320, 240, image::Rgb([90, 70, 60])));
    tokio::time::sleep(DEFAULT_TICK).await;
    let frame = outbound.recv().await.expect("a frame after one tick");
    assert_eq!((frame.width, frame.height), (320, 240));
    assert_eq!(&frame.jpeg[..2], &[0xff, 0xd8]);

    // perception replies
    inbound_tx
        .send(Ok(r#"{"skin_tone":"Wheatish","landmarks":[[11,100,50,0],[12,200,50,0],[23,200,150,0],[24,100,150,0]]}"#.into()))
        .unwrap();
    wait_for(&mut dashboard, |e| *e == DashboardEvent::Perception).await;
    assert_eq!(dashboard.perceived().skin_tone.as_deref(), Some("Wheatish"));

    let scene = dashboard
        .overlay()
        .compose(&OverlayInputs::from_state(&dashboard.perceived(), None), (320, 240));
    assert_eq!(scene.count(|s| matches!(s, Shape::Disc { .. })), 4);
    assert_eq!(scene.count(|s| matches!(s, Shape::Segment { .. })), 4);

    let _ = dashboard.compose_frame();
    assert_eq!(dashboard.overlay().canvas().dimensions(), (320, 240));
    let joint = dashboard.overlay().canvas().get_pixel(100, 50);
    assert_eq!(*joint, Rgba([0xd4, 0xaf, 0x37, 255]));

    // the new skin tone re-queries and the reply replaces the list
    wait_for(&mut dashboard, |e| *e == DashboardEvent::Recommendations(CompletionOutcome::Applied)).await;
    let last = stylist.queries.lock().unwrap().last().cloned().flatten();
    assert_eq!(last.map(|q| q.skin_tone), Some("Wheatish".to_string()));
    let shown = &dashboard.recommendations().displayed().garments;
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].name, "Kurta for Wheatish");

    // try it on, then tear down
    dashboard.handle(UserCommand::TryOnSlot(0));
    assert!(dashboard.tryon().is_active(4));
    dashboard.handle(UserCommand::DisableCamera);
    assert_eq!(webcam.stops.load(Ordering::SeqCst), 1);
    assert!(!dashboard.transmit().is_running());

    drop(inbound_tx);
    wait_for(&mut dashboard, |e| *e == DashboardEvent::PerceptionClosed).await;
    let stats = inbound.await.unwrap();
    assert_eq!(stats.applied, 1);
}
