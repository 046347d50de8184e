//! Coordinator for the mirror dashboard.
//!
//! Owns every piece of UI state and reconciles the reactive consumers
//! (transmit loop, overlay, recommendation queries) after each event.

use crate::camera::{CameraSession, CameraState};
use crate::overlay::{OverlayInputs, OverlayRenderer};
use crate::raster;
use crate::recommend::{CompletionOutcome, QueryInputs, RecommendationPipeline};
use crate::state::{PerceivedState, PerceptionReader};
use crate::streaming::channel::FrameSink;
use crate::streaming::transmit::{TransmitConditions, TransmitLoop};
use crate::tryon::TryOnSelection;
use crate::types::{BodyType, CategoryFilter, GarmentRecommendation};
use image::RgbaImage;
use tracing::{debug, info, warn};

const FALLBACK_PALETTE: [&str; 3] = ["Olive", "Coral", "Brown"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    EnableCamera,
    DisableCamera,
    RetryCamera,
    ToggleScanning,
    SetCategory(CategoryFilter),
    CycleCategory,
    /// Live edit of the style prompt.
    SetPrompt(String),
    /// Enter in the prompt box.
    SubmitPrompt,
    /// Try on the garment with this id.
    TryOn(u64),
    /// Try on the n-th garment of the filtered wardrobe (0-based).
    TryOnSlot(usize),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    Camera(CameraState),
    Perception,
    PerceptionClosed,
    Recommendations(CompletionOutcome),
    ChannelClosed,
}

pub struct Dashboard {
    camera: CameraSession,
    scanning: bool,
    transmit: TransmitLoop,
    sink: Option<FrameSink>,
    perception: PerceptionReader,
    perception_open: bool,
    tryon: TryOnSelection,
    filter: CategoryFilter,
    prompt: String,
    overlay: OverlayRenderer,
    recommendations: RecommendationPipeline,
    quit: bool,
}

async fn sink_closed(sink: Option<&FrameSink>) {
    match sink {
        Some(sink) => sink.closed().await,
        None => std::future::pending().await,
    }
}

impl Dashboard {
    pub fn new(
        camera: CameraSession,
        perception: PerceptionReader,
        recommendations: RecommendationPipeline,
        overlay: OverlayRenderer,
        transmit: TransmitLoop,
    ) -> Self {
        Self {
            camera,
            scanning: true,
            transmit,
            sink: None,
            perception,
            perception_open: true,
            tryon: TryOnSelection::default(),
            filter: CategoryFilter::All,
            prompt: String::new(),
            overlay,
            recommendations,
            quit: false,
        }
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn transmit(&self) -> &TransmitLoop {
        &self.transmit
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    pub fn recommendations(&self) -> &RecommendationPipeline {
        &self.recommendations
    }

    pub fn tryon(&self) -> &TryOnSelection {
        &self.tryon
    }

    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn has_channel(&self) -> bool {
        self.sink.is_some()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn perceived(&self) -> PerceivedState {
        self.perception.snapshot()
    }

    /// Hooks up the outbound half of a freshly opened perception channel.
    pub fn attach_channel(&mut self, sink: FrameSink) {
        info!(channel = sink.id(), "perception channel attached");
        self.sink = Some(sink);
        self.sync();
    }

    /// Kicks off the startup fetch and the first reconciliation.
    pub fn start(&mut self) {
        self.recommendations.seed();
        self.sync();
    }

    pub fn handle(&mut self, command: UserCommand) {
        debug!(?command, "user command");
        match command {
            UserCommand::EnableCamera => {
                self.camera.enable();
            }
            UserCommand::DisableCamera => self.camera.disable(),
            UserCommand::RetryCamera => {
                self.camera.retry();
            }
            UserCommand::ToggleScanning => self.scanning = !self.scanning,
            UserCommand::SetCategory(filter) => self.filter = filter,
            UserCommand::CycleCategory => self.filter = self.filter.next(),
            UserCommand::SetPrompt(prompt) => self.prompt = prompt,
            UserCommand::SubmitPrompt => self.filter = CategoryFilter::All,
            UserCommand::TryOn(id) => {
                if let Some(garment) = self.recommendations.garment(id).cloned() {
                    self.toggle_tryon(&garment);
                }
            }
            UserCommand::TryOnSlot(slot) => {
                let garment = self.recommendations.wardrobe(self.filter).get(slot).map(|g| (*g).clone());
                if let Some(garment) = garment {
                    self.toggle_tryon(&garment);
                }
            }
            UserCommand::Quit => self.quit = true,
        }
        self.sync();
    }

    // Any try-on, including removal, turns scanning back on.
    fn toggle_tryon(&mut self, garment: &GarmentRecommendation) {
        let change = self.tryon.toggle(garment);
        debug!(?change, garment = %garment.name, "try-on");
        self.scanning = true;
    }

    /// Waits for the next thing that can change what the dashboard shows.
    pub async fn next_event(&mut self) -> DashboardEvent {
        let event = tokio::select! {
            state = self.camera.settle() => DashboardEvent::Camera(state),
            open = self.perception.changed(), if self.perception_open => {
                if open { DashboardEvent::Perception } else { DashboardEvent::PerceptionClosed }
            }
            outcome = self.recommendations.next_completion() => DashboardEvent::Recommendations(outcome),
            _ = sink_closed(self.sink.as_ref()) => DashboardEvent::ChannelClosed,
        };

        match &event {
            DashboardEvent::PerceptionClosed => {
                warn!("perception updates ended; showing last known state");
                self.perception_open = false;
            }
            DashboardEvent::ChannelClosed => {
                warn!("perception channel closed; frame transmission stopped");
                self.sink = None;
            }
            _ => {}
        }
        self.sync();
        event
    }

    /// Brings every reactive consumer in line with the current state. Each
    /// consumer acts only if its own inputs moved.
    pub fn sync(&mut self) {
        self.transmit.reconcile(&TransmitConditions {
            surface: self.camera.surface(),
            scanning: self.scanning,
            sink: self.sink.clone(),
        });

        let state = self.perception.snapshot();
        self.refresh_overlay(&state);
        self.recommendations
            .observe(&QueryInputs::from_state(&state, self.filter, &self.prompt));
    }

    // Paused scanning freezes the last overlay.
    fn refresh_overlay(&mut self, state: &PerceivedState) {
        if !self.scanning {
            return;
        }
        let dims = self.camera.surface().and_then(|s| s.dimensions());
        let inputs = OverlayInputs::from_state(state, self.tryon.active());
        self.overlay.render(&inputs, dims);
    }

    /// The current video frame with overlays, in display orientation.
    pub fn compose_frame(&mut self) -> Option<RgbaImage> {
        let frame = self.camera.surface()?.current()?;
        let state = self.perception.snapshot();
        self.refresh_overlay(&state);
        Some(raster::composite(&frame, self.overlay.canvas(), self.overlay.style().mirror))
    }

    /// Text panel describing camera, analysis and recommendation state.
    pub fn hud(&self) -> Vec<String> {
        let state = self.perception.snapshot();
        let metrics = state.metrics.clone().unwrap_or_default();
        let mut lines = Vec::new();

        lines.push(match self.camera.state() {
            CameraState::Idle => "Camera Access Required - press E to enable".to_string(),
            CameraState::Requesting => "Requesting Access...".to_string(),
            CameraState::Error => format!(
                "Access Denied: {} - press R to try again",
                self.camera.error_message().unwrap_or("Camera access denied")
            ),
            CameraState::Active => "AI ANALYSIS ACTIVE".to_string(),
        });

        let mut status = format!("ANALYSIS: {}", if self.scanning { "LIVE" } else { "PAUSED" });
        if let Some(vibe) = &metrics.vibe_match {
            status.push_str(&format!("   VIBE: {vibe}"));
        }
        if !self.has_channel() {
            status.push_str("   (offline)");
        }
        lines.push(status);
        if let Some(garment) = self.tryon.active() {
            lines.push(format!("TRYING ON: {}", garment.name.to_uppercase()));
        }

        lines.push(String::new());
        lines.push("BODY METRICS".to_string());
        lines.push(format!("Estimated Height: {}", metrics.height.as_deref().unwrap_or("175 cm")));
        lines.push(format!("Ratio: {}", metrics.ratio.map_or("1.0".to_string(), |r| r.to_string())));
        lines.push(format!("Shoulder Width: {}", pixels_or_analyzing(metrics.shoulder_width)));
        lines.push(format!("Waist Width: {}", pixels_or_analyzing(metrics.waist_width)));
        let body = metrics.body_type;
        lines.push(format!(
            "{} - {}",
            body.map_or("Analyzing...", |b| b.as_str()),
            body.unwrap_or(BodyType::Unknown).description()
        ));
        lines.push(format!("Skin Tone: {}", state.skin_tone.as_deref().unwrap_or("Detecting...")));

        let shown = self.recommendations.displayed();
        let palette: Vec<&str> = if shown.palette.is_empty() {
            FALLBACK_PALETTE.to_vec()
        } else {
            shown.palette.iter().map(|c| c.name.as_str()).collect()
        };
        lines.push(format!("Palette: {}", palette.join(", ")));

        lines.push(String::new());
        lines.push(format!("VIRTUAL WARDROBE [{}]", self.filter));
        let wardrobe = self.recommendations.wardrobe(self.filter);
        if wardrobe.is_empty() {
            lines.push("Scanning for best matches...".to_string());
        }
        for (i, garment) in wardrobe.iter().enumerate().take(9) {
            let marker = if self.tryon.is_active(garment.id) { " [ON]" } else { "" };
            lines.push(format!("{}. {} {} Match{}", i + 1, garment.name, garment.match_label(), marker));
        }

        lines.push(String::new());
        lines.push(format!("Style: {}", if self.prompt.is_empty() { "-" } else { self.prompt.as_str() }));
        match &shown.body_advice {
            Some(advice) => lines.push(format!("Tip: {advice}")),
            None => lines.push(format!(
                "Style Tip for {}: Tailored fits showcase your natural build.",
                body.map_or("you", |b| b.as_str())
            )),
        }
        lines
    }
}

fn pixels_or_analyzing(value: Option<f32>) -> String {
    value.map_or("Analyzing...".to_string(), |v| format!("{v}px"))
}
