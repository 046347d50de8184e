//! Rusty Mirror: a camera dashboard that streams frames to a perception
//! service, draws pose, try-on and skin-scan overlays from its replies and
//! keeps style recommendations in step with what it perceives.

pub mod args;
pub mod camera;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod font;
pub mod output;
pub mod overlay;
pub mod periodic;
pub mod raster;
pub mod recommend;
pub mod state;
pub mod streaming;
pub mod tryon;
pub mod ttf;
pub mod types;
