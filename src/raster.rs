//! CPU rasterisation of overlay scenes.
//!
//! Each shape is first turned into a coverage mask (the set of pixels whose
//! centres it covers) and the mask is then blended once, source-over. A
//! translucent fill therefore never darkens where its own edges overlap.

use crate::font::{self, GLYPH_HEIGHT};
use crate::overlay::{Glow, Scene, Shape};
use crate::ttf::FontRenderer;
use crate::types::Point;
use image::{imageops, Rgba, RgbImage, RgbaImage};
use std::collections::HashSet;

const GLOW_RINGS: u32 = 3;

/// Source-over blend of `src` onto the pixel at (x, y). Out-of-bounds is ignored.
pub fn blend_pixel(img: &mut RgbaImage, x: i32, y: i32, src: Rgba<u8>) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    *dst = over(*dst, src);
}

fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round() as u8;
    Rgba(out)
}

/// Pixels covered by one shape, clipped to the canvas.
#[derive(Debug, Clone)]
pub struct Coverage {
    width: u32,
    height: u32,
    pixels: HashSet<(u32, u32)>,
}

impl Coverage {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: HashSet::new() }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.pixels.contains(&(x, y))
    }

    fn mark(&mut self, x: i64, y: i64) {
        if x >= 0 && y >= 0 && (x as u64) < self.width as u64 && (y as u64) < self.height as u64 {
            self.pixels.insert((x as u32, y as u32));
        }
    }

    // Pixel index range whose centres may fall inside [lo, hi], clipped to [0, limit)
    fn span(lo: f32, hi: f32, limit: u32) -> std::ops::RangeInclusive<i64> {
        let first = ((lo - 0.5).floor() as i64).max(0);
        let last = ((hi - 0.5).ceil() as i64).min(limit as i64 - 1);
        first..=last
    }

    fn columns(&self, lo: f32, hi: f32) -> std::ops::RangeInclusive<i64> {
        Self::span(lo, hi, self.width)
    }

    fn rows(&self, lo: f32, hi: f32) -> std::ops::RangeInclusive<i64> {
        Self::span(lo, hi, self.height)
    }

    pub fn disc(&mut self, center: Point, radius: f32) {
        let r2 = radius * radius;
        for y in self.rows(center.y - radius, center.y + radius) {
            for x in self.columns(center.x - radius, center.x + radius) {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                if dx * dx + dy * dy <= r2 {
                    self.mark(x, y);
                }
            }
        }
    }

    /// A line of the given width. Round caps extend half the width past the
    /// endpoints; butt caps stop exactly at them.
    pub fn segment(&mut self, a: Point, b: Point, width: f32, round_caps: bool) {
        let r = (width / 2.0).max(0.5);
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len2 = dx * dx + dy * dy;

        for y in self.rows(a.y.min(b.y) - r, a.y.max(b.y) + r) {
            for x in self.columns(a.x.min(b.x) - r, a.x.max(b.x) + r) {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let mut t = if len2 > 0.0 { ((px - a.x) * dx + (py - a.y) * dy) / len2 } else { 0.0 };
                if round_caps {
                    t = t.clamp(0.0, 1.0);
                } else if !(0.0..=1.0).contains(&t) {
                    continue;
                }
                let (qx, qy) = (a.x + t * dx - px, a.y + t * dy - py);
                if qx * qx + qy * qy <= r * r {
                    self.mark(x, y);
                }
            }
        }
    }

    pub fn polyline(&mut self, points: &[Point], width: f32, closed: bool) {
        for pair in points.windows(2) {
            self.segment(pair[0], pair[1], width, true);
        }
        if closed && points.len() > 2 {
            self.segment(points[points.len() - 1], points[0], width, true);
        }
    }

    /// Even-odd scanline fill sampled at pixel centres.
    pub fn polygon(&mut self, points: &[Point]) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

        let mut crossings = Vec::with_capacity(points.len());
        for y in self.rows(min_y, max_y) {
            let sy = y as f32 + 0.5;
            crossings.clear();
            for (i, p) in points.iter().enumerate() {
                let q = points[(i + 1) % points.len()];
                if (p.y <= sy && sy < q.y) || (q.y <= sy && sy < p.y) {
                    crossings.push(p.x + (sy - p.y) / (q.y - p.y) * (q.x - p.x));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                // centres in [left, right)
                let first = ((pair[0] - 0.5).ceil() as i64).max(0);
                let last = ((pair[1] - 0.5).ceil() as i64 - 1).min(self.width as i64 - 1);
                for x in first..=last {
                    self.mark(x, y);
                }
            }
        }
    }

    /// Dashed outline of an axis-aligned rectangle. The dash phase carries
    /// around the corners. Only the part of each edge near the canvas is
    /// walked, so the cost does not depend on how far the corners reach.
    pub fn dashed_rect(&mut self, min: Point, max: Point, dash: [f32; 2], width: f32) {
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return;
        }
        let corners = [min, Point::new(max.x, min.y), max, Point::new(min.x, max.y)];
        let [on, off] = dash;
        let period = on + off;
        if on <= 0.0 || period <= 0.0 {
            self.polyline(&corners, width, true);
            return;
        }
        let (on, period) = (on as f64, period as f64);
        let margin = width as f64 + 1.0;
        let bounds = (-margin, self.width as f64 + margin, -margin, self.height as f64 + margin);

        let mut travelled = 0.0f64;
        for (i, from) in corners.iter().enumerate() {
            let to = corners[(i + 1) % corners.len()];
            let (fx, fy) = (from.x as f64, from.y as f64);
            let (dx, dy) = (to.x as f64 - fx, to.y as f64 - fy);
            let length = (dx * dx + dy * dy).sqrt();
            if length == 0.0 {
                continue;
            }
            let Some((start, stop)) = clip_edge((fx, fy), (dx, dy), length, bounds) else {
                travelled += length;
                continue;
            };
            let at = |s: f64| Point::new((fx + dx * s / length) as f32, (fy + dy * s / length) as f32);

            // walk offsets from `start` so the step never vanishes against a large position
            let base = (travelled + start) % period;
            let visible = stop - start;
            let mut u = 0.0f64;
            while u < visible {
                let phase = (base + u) % period;
                if phase < on {
                    let end = (u + on - phase).min(visible);
                    self.segment(at(start + u), at(start + end), width, false);
                    u = end;
                } else {
                    u = (u + period - phase).min(visible);
                }
            }
            travelled += length;
        }
    }

    pub fn union(&mut self, other: &Coverage) {
        self.pixels.extend(other.pixels.iter().copied());
    }

    pub fn subtract(&mut self, other: &Coverage) {
        self.pixels.retain(|p| !other.pixels.contains(p));
    }

    pub fn paint(&self, img: &mut RgbaImage, color: Rgba<u8>) {
        for &(x, y) in &self.pixels {
            blend_pixel(img, x as i32, y as i32, color);
        }
    }
}

// Distance range along an edge that lies inside `bounds` (x0, x1, y0, y1).
fn clip_edge(from: (f64, f64), dir: (f64, f64), length: f64, bounds: (f64, f64, f64, f64)) -> Option<(f64, f64)> {
    let (x0, x1, y0, y1) = bounds;
    let mut range = (0.0f64, length);
    for (origin, delta, lo, hi) in [(from.0, dir.0, x0, x1), (from.1, dir.1, y0, y1)] {
        if delta == 0.0 {
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }
        let a = (lo - origin) / delta * length;
        let b = (hi - origin) / delta * length;
        range.0 = range.0.max(a.min(b));
        range.1 = range.1.min(a.max(b));
    }
    (range.0 < range.1).then_some(range)
}

/// Text on RGBA canvases: a TrueType face when one was found, else the bitmap font.
#[derive(Clone, Default)]
pub struct TextPainter {
    ttf: Option<FontRenderer>,
}

impl TextPainter {
    pub fn bitmap() -> Self {
        Self { ttf: None }
    }

    pub fn with_font(ttf: Option<FontRenderer>) -> Self {
        Self { ttf }
    }

    fn bitmap_scale(size_px: f32) -> u32 {
        ((size_px / GLYPH_HEIGHT as f32).round() as u32).max(1)
    }

    /// Draws with the top-left corner at (x, y).
    pub fn draw(&self, img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, size_px: f32) {
        match &self.ttf {
            Some(ttf) => ttf.draw_text(img, x, y, text, color, size_px),
            None => font::draw_text_line(img, x, y, text, color, Self::bitmap_scale(size_px)),
        }
    }

    pub fn line_height(&self, size_px: f32) -> u32 {
        match &self.ttf {
            Some(ttf) => ttf.measure_height(size_px),
            None => (GLYPH_HEIGHT + 2) * Self::bitmap_scale(size_px),
        }
    }

    pub fn width(&self, text: &str, size_px: f32) -> u32 {
        match &self.ttf {
            Some(ttf) => ttf.measure_width(text, size_px),
            None => font::measure_text_width(text, Self::bitmap_scale(size_px)),
        }
    }
}

fn faded(color: Rgba<u8>, factor: f32) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], (color[3] as f32 * factor).round() as u8])
}

/// Soft halo: disjoint rings around `base`, fading outward, painted under it.
fn paint_glow(img: &mut RgbaImage, glow: &Glow, base: &Coverage, dilate: impl Fn(f32) -> Coverage) {
    let mut inner = base.clone();
    for ring in 1..=GLOW_RINGS {
        let spread = glow.radius * 0.5 * ring as f32 / GLOW_RINGS as f32;
        let mut cover = dilate(spread);
        let mut band = cover.clone();
        band.subtract(&inner);
        let strength = 0.5 * (GLOW_RINGS + 1 - ring) as f32 / GLOW_RINGS as f32;
        band.paint(img, faded(glow.color, strength));
        cover.union(&inner);
        inner = cover;
    }
}

fn paint_shape(img: &mut RgbaImage, shape: &Shape, text: &TextPainter) {
    let (w, h) = img.dimensions();
    match shape {
        Shape::Polygon { points, fill, stroke, width, glow } => {
            let mut body = Coverage::new(w, h);
            body.polygon(points);
            let mut outline = Coverage::new(w, h);
            outline.polyline(points, *width, true);

            if let Some(glow) = glow {
                let mut base = body.clone();
                base.union(&outline);
                paint_glow(img, glow, &base, |spread| {
                    let mut c = Coverage::new(w, h);
                    c.polyline(points, width + 2.0 * spread, true);
                    c
                });
            }
            body.paint(img, *fill);
            outline.paint(img, *stroke);
        }
        Shape::Disc { center, radius, color, glow } => {
            let mut body = Coverage::new(w, h);
            body.disc(*center, *radius);
            if let Some(glow) = glow {
                paint_glow(img, glow, &body, |spread| {
                    let mut c = Coverage::new(w, h);
                    c.disc(*center, radius + spread);
                    c
                });
            }
            body.paint(img, *color);
        }
        Shape::Segment { from, to, width, color, glow } => {
            let mut body = Coverage::new(w, h);
            body.segment(*from, *to, *width, true);
            if let Some(glow) = glow {
                paint_glow(img, glow, &body, |spread| {
                    let mut c = Coverage::new(w, h);
                    c.segment(*from, *to, width + 2.0 * spread, true);
                    c
                });
            }
            body.paint(img, *color);
        }
        Shape::DashedRect { min, max, dash, width, color } => {
            let mut body = Coverage::new(w, h);
            body.dashed_rect(*min, *max, *dash, *width);
            body.paint(img, *color);
        }
        Shape::Polyline { points, width, color } => {
            let mut body = Coverage::new(w, h);
            body.polyline(points, *width, false);
            body.paint(img, *color);
        }
        Shape::Label { baseline, text: label, size, color } => {
            // canvas text sits on its baseline; painters take the top edge
            let top = baseline.y - text.line_height(*size) as f32 * 0.8;
            text.draw(img, baseline.x.round() as i32, top.round() as i32, label, *color, *size);
        }
    }
}

/// Clears `canvas` and draws every shape of `scene` in order.
pub fn paint_scene(canvas: &mut RgbaImage, scene: &Scene, text: &TextPainter) {
    if canvas.dimensions() != (scene.width, scene.height) {
        *canvas = RgbaImage::new(scene.width, scene.height);
    } else {
        canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }
    for shape in &scene.shapes {
        paint_shape(canvas, shape, text);
    }
}

/// Puts `overlay` over the video frame. The frame is flipped first when
/// mirroring; the overlay is expected to be laid out in display space already.
/// An overlay of another size (a resolution change in flight) is skipped.
pub fn composite(frame: &RgbImage, overlay: &RgbaImage, mirror: bool) -> RgbaImage {
    let mut out = RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        Rgba([r, g, b, 255])
    });
    if mirror {
        imageops::flip_horizontal_in_place(&mut out);
    }
    if overlay.dimensions() == out.dimensions() {
        for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
            if src[3] != 0 {
                *dst = over(*dst, *src);
            }
        }
    }
    out
}

/// Translucent box, e.g. behind HUD text.
pub fn fill_rect(img: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
    for py in y..y + height as i32 {
        for px in x..x + width as i32 {
            blend_pixel(img, px, py, color);
        }
    }
}
