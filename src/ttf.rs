use crate::raster::blend_pixel;
use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Clone)]
pub struct FontRenderer {
    font: Font<'static>,
}

impl FontRenderer {
    pub fn try_load(family: &str) -> Option<Self> {
        // Naive search over common macOS/Linux font paths.
        // Family is like "DejaVuSansMono" or "Arial"; files are "<family>.ttf"
        let paths = [
            format!("/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/Supplemental/{}.ttf", family),
            format!("/usr/share/fonts/truetype/{}.ttf", family),
            format!("/usr/share/fonts/TTF/{}.ttf", family),
            format!("/usr/share/fonts/truetype/dejavu/{}.ttf", family),
            // local dir
            format!("{}.ttf", family),
        ];

        for p in paths.iter() {
            if !Path::new(p).exists() {
                continue;
            }
            if let Ok(data) = fs::read(p) {
                if let Some(font) = Font::try_from_vec(data) {
                    info!("Loaded font from {}", p);
                    return Some(Self { font });
                }
            }
        }

        debug!("Could not find font family '{}'. Falling back to bitmap.", family);
        None
    }

    /// Draws `text` with its top-left at (x, y). Glyph coverage scales the
    /// colour's alpha, so edges stay antialiased over whatever is below.
    pub fn draw_text(&self, img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, size_px: f32) {
        let scale = Scale::uniform(size_px);
        let v_metrics = self.font.v_metrics(scale);
        let start = point(x as f32, y as f32 + v_metrics.ascent);

        for glyph in self.font.layout(text, scale, start) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, v| {
                let alpha = (v * color[3] as f32).round() as u8;
                if alpha == 0 {
                    return;
                }
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                blend_pixel(img, px, py, Rgba([color[0], color[1], color[2], alpha]));
            });
        }
    }

    pub fn measure_height(&self, size_px: f32) -> u32 {
        let v_metrics = self.font.v_metrics(Scale::uniform(size_px));
        (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).ceil() as u32
    }

    pub fn measure_width(&self, text: &str, size_px: f32) -> u32 {
        let scale = Scale::uniform(size_px);
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box().map(|bb| bb.max.x))
            .max()
            .unwrap_or(0)
            .max(0) as u32
    }
}
