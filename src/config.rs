use anyhow::{Context, Result};
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub perception_url: String,
    pub recommend_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: u32,
    pub tick_ms: u64,
    pub jpeg_quality: u8,
    pub mirror_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub menu_scale: u32,
    pub font_size_pt: u32,
    pub font_family: String,
    pub marker_radius: f32,
    pub skeleton_color_hex: String,
    pub roi_color_hex: String,
    pub fallback_garment_hex: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            perception_url: "http://localhost:50051".to_string(),
            recommend_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            tick_ms: 150,
            jpeg_quality: 50,
            mirror_mode: true,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            menu_scale: 2,
            font_size_pt: 12,
            font_family: "Monospace".to_string(),
            marker_radius: 4.0,
            skeleton_color_hex: "#d4af37".to_string(),
            roi_color_hex: "#00f2ff".to_string(),
            fallback_garment_hex: "#222222".to_string(),
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            // Missing fields fall back to Default thanks to #[serde(default)]
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        // Always save back so new fields show up in the file
        config.save(path)?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    let digits = hex.strip_prefix('#')?;
    if !digits.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match digits.len() {
        3 => {
            let mut out = [0u8, 0, 0, 255];
            for (i, c) in digits.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(Rgba(out))
        }
        6 | 8 => {
            let r = channel(&digits[0..2])?;
            let g = channel(&digits[2..4])?;
            let b = channel(&digits[4..6])?;
            let a = if digits.len() == 8 { channel(&digits[6..8])? } else { 255 };
            Some(Rgba([r, g, b, a]))
        }
        _ => None,
    }
}

/// Like [`parse_hex`] but falls back to `fallback` for malformed input.
pub fn hex_or(hex: &str, fallback: Rgba<u8>) -> Rgba<u8> {
    parse_hex(hex).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#FF0000"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(parse_hex("#00ff00"), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(parse_hex("#0000FF66"), Some(Rgba([0, 0, 255, 0x66])));
        assert_eq!(parse_hex("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_hex("invalid"), None);
        assert_eq!(parse_hex("#12345"), None);
        assert_eq!(hex_or("nope", Rgba([1, 2, 3, 4])), Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.capture.tick_ms, 150);
        assert_eq!(config.capture.jpeg_quality, 50);
        assert_eq!(config.server.perception_url, "http://localhost:50051");
        assert_eq!(config.server.recommend_url, "http://localhost:8000");
        assert!(path.exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"capture":{"camera_index":2}}"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.capture.camera_index, 2);
        assert_eq!(config.capture.tick_ms, 150);
        assert_eq!(config.ui.roi_color_hex, "#00f2ff");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("skeleton_color_hex"));
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.request_timeout_ms, 5000);
    }
}
