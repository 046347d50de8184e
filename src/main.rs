use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use rusty_mirror::args::Args;
use rusty_mirror::camera::{self, CameraSession, NokhwaSource};
use rusty_mirror::config::AppConfig;
use rusty_mirror::dashboard::Dashboard;
use rusty_mirror::output::WindowOutput;
use rusty_mirror::overlay::{OverlayRenderer, OverlayStyle};
use rusty_mirror::raster::TextPainter;
use rusty_mirror::recommend::{HttpRecommender, RecommendationPipeline};
use rusty_mirror::state::{perception_store, PerceptionWriter};
use rusty_mirror::streaming::channel::{spawn_inbound, FrameSink};
use rusty_mirror::streaming::grpc_client::PerceptionClient;
use rusty_mirror::streaming::transmit::TransmitLoop;
use rusty_mirror::ttf::FontRenderer;

const WINDOW_WIDTH: usize = 960;
const WINDOW_HEIGHT: usize = 540;
const FRAME_INTERVAL: Duration = Duration::from_micros(16600);

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("rusty_mirror={level},tonic=warn,h2=warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.list {
        return camera::list_cameras();
    }

    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);

    // The window is not Send, so everything runs on this thread.
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

/// Opens the analysis stream. Without it the dashboard still runs, it just
/// never receives estimates.
async fn connect_perception(url: &str, writer: PerceptionWriter) -> Option<FrameSink> {
    let mut client = match PerceptionClient::connect(url.to_string()).await {
        Ok(client) => client,
        Err(e) => {
            warn!("Perception service unreachable at {url}: {e}");
            return None;
        }
    };

    match client.check_health().await {
        Ok(true) => info!("Perception service at {url} is serving"),
        Ok(false) => warn!("Perception service at {url} reports NOT_SERVING"),
        Err(e) => warn!("Perception health check failed: {e}"),
    }

    match client.open_stream().await {
        Ok((sink, inbound)) => {
            spawn_inbound(inbound, writer);
            Some(sink)
        }
        Err(e) => {
            warn!("Could not open perception stream: {e}");
            None
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let (writer, reader) = perception_store();
    let sink = connect_perception(&config.server.perception_url, writer).await;

    let recommender = HttpRecommender::new(
        &config.server.recommend_url,
        Duration::from_millis(config.server.request_timeout_ms),
    )?;

    let text = TextPainter::with_font(FontRenderer::try_load(&config.ui.font_family));
    let overlay = OverlayRenderer::new(
        OverlayStyle::from_config(&config.ui, config.capture.mirror_mode),
        text.clone(),
    );
    let transmit = TransmitLoop::new(Duration::from_millis(config.capture.tick_ms), config.capture.jpeg_quality);
    let camera = CameraSession::new(Arc::new(NokhwaSource::new(config.capture.camera_index)));

    let mut dashboard = Dashboard::new(
        camera,
        reader,
        RecommendationPipeline::new(Arc::new(recommender)),
        overlay,
        transmit,
    );
    if let Some(sink) = sink {
        dashboard.attach_channel(sink);
    }
    dashboard.start();

    let text_size = (config.ui.font_size_pt * config.ui.menu_scale.max(1) / 2).max(8) as f32;
    let mut window = WindowOutput::new("Rusty Mirror", WINDOW_WIDTH, WINDOW_HEIGHT, text, text_size)?;
    println!("{}", "Rusty Mirror started.".green());
    println!("Controls: [E] Enable camera [D] Disable [R] Retry [Space] Scan on/off [C] Category [1-9] Try on [Tab] Style prompt [Esc] Quit");

    let mut frame_tick = tokio::time::interval(FRAME_INTERVAL);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while window.is_open() && !dashboard.should_quit() {
        tokio::select! {
            event = dashboard.next_event() => debug!(?event, "dashboard event"),
            _ = frame_tick.tick() => {
                for command in window.poll_commands() {
                    dashboard.handle(command);
                }
                let frame = dashboard.compose_frame();
                window.present(frame, &dashboard.hud())?;
            }
        }
    }

    let stats = dashboard.transmit().stats();
    info!(
        sent = stats.sent,
        dropped = stats.dropped,
        skipped = stats.skipped,
        "shutting down"
    );
    Ok(())
}
