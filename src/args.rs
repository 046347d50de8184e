use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera Index (overrides config)
    #[arg(short, long)]
    pub cam_index: Option<u32>,

    /// Path to the JSON configuration file
    #[arg(long, default_value = AppConfig::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Perception service gRPC endpoint (e.g. http://localhost:50051)
    #[arg(long)]
    pub perception_url: Option<String>,

    /// Recommendation service base URL (e.g. http://localhost:8000)
    #[arg(long)]
    pub recommend_url: Option<String>,

    /// Mirror the camera output
    #[arg(long)]
    pub mirror: Option<bool>,

    /// List available cameras
    #[arg(long)]
    pub list: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command-line values win over the file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(index) = self.cam_index {
            config.capture.camera_index = index;
        }
        if let Some(url) = &self.perception_url {
            config.server.perception_url = url.clone();
        }
        if let Some(url) = &self.recommend_url {
            config.server.recommend_url = url.clone();
        }
        if let Some(mirror) = self.mirror {
            config.capture.mirror_mode = mirror;
        }
    }
}
