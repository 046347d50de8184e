//! Skeleton, garment try-on and skin-scan overlays.
//!
//! `compose` turns the current inputs into a display list; the renderer
//! rasterises it onto a transparent canvas the size of the video.

use crate::config::{hex_or, UiConfig};
use crate::raster::{self, TextPainter};
use crate::state::{Memo, PerceivedState};
use crate::types::landmark_ids::{LEFT_HIP, LEFT_SHOULDER, RIGHT_HIP, RIGHT_SHOULDER};
use crate::types::{GarmentRecommendation, Landmarks, Point, SkinRoi};
use image::{Rgba, RgbaImage};
use tracing::trace;

/// Garment quadrilateral, in drawing order.
pub const TORSO: [i32; 4] = [LEFT_SHOULDER, RIGHT_SHOULDER, RIGHT_HIP, LEFT_HIP];

pub const SKELETON_EDGES: [(i32, i32); 4] = [
    (LEFT_SHOULDER, RIGHT_SHOULDER),
    (LEFT_SHOULDER, LEFT_HIP),
    (RIGHT_SHOULDER, RIGHT_HIP),
    (LEFT_HIP, RIGHT_HIP),
];

pub const SKELETON_WIDTH: f32 = 3.0;
pub const SKELETON_GLOW: f32 = 10.0;
pub const GARMENT_FILL_ALPHA: u8 = 0x66;
pub const GARMENT_STROKE_WIDTH: f32 = 2.0;
pub const GARMENT_GLOW: f32 = 15.0;
pub const ROI_DASH: [f32; 2] = [3.0, 3.0];
pub const ROI_WIDTH: f32 = 1.0;
pub const ROI_BRACKET: f32 = 6.0;
pub const ROI_BRACKET_WIDTH: f32 = 2.0;
pub const ROI_LABEL: &str = "SKIN SCAN";
pub const ROI_LABEL_OFFSET: f32 = 4.0;
pub const ROI_LABEL_SIZE: f32 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub color: Rgba<u8>,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Closed path: filled, then stroked.
    Polygon {
        points: Vec<Point>,
        fill: Rgba<u8>,
        stroke: Rgba<u8>,
        width: f32,
        glow: Option<Glow>,
    },
    Disc {
        center: Point,
        radius: f32,
        color: Rgba<u8>,
        glow: Option<Glow>,
    },
    Segment {
        from: Point,
        to: Point,
        width: f32,
        color: Rgba<u8>,
        glow: Option<Glow>,
    },
    DashedRect {
        min: Point,
        max: Point,
        dash: [f32; 2],
        width: f32,
        color: Rgba<u8>,
    },
    /// Open path.
    Polyline {
        points: Vec<Point>,
        width: f32,
        color: Rgba<u8>,
    },
    Label {
        baseline: Point,
        text: String,
        size: f32,
        color: Rgba<u8>,
    },
}

/// A display list for one overlay canvas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub shapes: Vec<Shape>,
}

impl Scene {
    pub fn polygons(&self) -> impl Iterator<Item = &Vec<Point>> {
        self.shapes.iter().filter_map(|s| match s {
            Shape::Polygon { points, .. } => Some(points),
            _ => None,
        })
    }

    pub fn count(&self, matches: impl Fn(&Shape) -> bool) -> usize {
        self.shapes.iter().filter(|s| matches(s)).count()
    }
}

/// Everything the overlay depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayInputs {
    pub landmarks: Landmarks,
    pub skin_roi: Option<SkinRoi>,
    pub garment: Option<GarmentRecommendation>,
}

impl OverlayInputs {
    pub fn from_state(state: &PerceivedState, garment: Option<&GarmentRecommendation>) -> Self {
        Self {
            landmarks: state.landmarks.clone(),
            skin_roi: state.skin_roi,
            garment: garment.cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub skeleton: Rgba<u8>,
    pub roi: Rgba<u8>,
    pub fallback_garment: Rgba<u8>,
    pub marker_radius: f32,
    /// Lay shapes out for a horizontally flipped video.
    pub mirror: bool,
}

impl OverlayStyle {
    pub fn from_config(ui: &UiConfig, mirror: bool) -> Self {
        Self {
            skeleton: hex_or(&ui.skeleton_color_hex, Rgba([0xd4, 0xaf, 0x37, 255])),
            roi: hex_or(&ui.roi_color_hex, Rgba([0, 242, 255, 255])),
            fallback_garment: hex_or(&ui.fallback_garment_hex, Rgba([34, 34, 34, 255])),
            marker_radius: ui.marker_radius,
            mirror,
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from_config(&UiConfig::default(), false)
    }
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    text: TextPainter,
    canvas: RgbaImage,
    last: Memo<(OverlayInputs, (u32, u32))>,
    redraws: u64,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, text: TextPainter) -> Self {
        Self {
            style,
            text,
            canvas: RgbaImage::new(0, 0),
            last: Memo::default(),
            redraws: 0,
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    /// Builds the display list for `inputs` on a canvas of `dims`.
    pub fn compose(&self, inputs: &OverlayInputs, dims: (u32, u32)) -> Scene {
        let (width, height) = dims;
        let place = |p: Point| {
            if self.style.mirror {
                Point::new(width as f32 - p.x, p.y)
            } else {
                p
            }
        };
        let mut shapes = Vec::new();

        if !inputs.landmarks.is_empty() {
            if let Some(garment) = &inputs.garment {
                // all four anchors or nothing
                if let Some(torso) = inputs.landmarks.resolve(TORSO) {
                    let color = garment
                        .color
                        .as_deref()
                        .map(|hex| hex_or(hex, self.style.fallback_garment))
                        .unwrap_or(self.style.fallback_garment);
                    shapes.push(Shape::Polygon {
                        points: torso.into_iter().map(place).collect(),
                        fill: Rgba([color[0], color[1], color[2], GARMENT_FILL_ALPHA]),
                        stroke: color,
                        width: GARMENT_STROKE_WIDTH,
                        glow: Some(Glow { color, radius: GARMENT_GLOW }),
                    });
                }
            }

            let glow = Some(Glow { color: self.style.skeleton, radius: SKELETON_GLOW });
            for lm in &inputs.landmarks.points {
                shapes.push(Shape::Disc {
                    center: place(lm.point()),
                    radius: self.style.marker_radius,
                    color: self.style.skeleton,
                    glow,
                });
            }
            for (a, b) in SKELETON_EDGES {
                if let Some([from, to]) = inputs.landmarks.resolve([a, b]) {
                    shapes.push(Shape::Segment {
                        from: place(from),
                        to: place(to),
                        width: SKELETON_WIDTH,
                        color: self.style.skeleton,
                        glow,
                    });
                }
            }
        }

        if let Some(roi) = inputs.skin_roi {
            let a = place(Point::new(roi.x1, roi.y1));
            let b = place(Point::new(roi.x2, roi.y2));
            let min = Point::new(a.x.min(b.x), a.y.min(b.y));
            let max = Point::new(a.x.max(b.x), a.y.max(b.y));
            shapes.push(Shape::DashedRect {
                min,
                max,
                dash: ROI_DASH,
                width: ROI_WIDTH,
                color: self.style.roi,
            });

            // accent on the (x1, y1) corner, pointing into the rectangle
            let dx = if self.style.mirror { -ROI_BRACKET } else { ROI_BRACKET };
            shapes.push(Shape::Polyline {
                points: vec![Point::new(a.x, a.y + ROI_BRACKET), a, Point::new(a.x + dx, a.y)],
                width: ROI_BRACKET_WIDTH,
                color: self.style.roi,
            });
            shapes.push(Shape::Label {
                baseline: Point::new(min.x, roi.y1 - ROI_LABEL_OFFSET),
                text: ROI_LABEL.to_string(),
                size: ROI_LABEL_SIZE,
                color: self.style.roi,
            });
        }

        Scene { width, height, shapes }
    }

    /// Redraws when the inputs or the video resolution changed. `dims` of
    /// `None` (no decoded frame yet) keeps the current canvas size.
    pub fn render(&mut self, inputs: &OverlayInputs, dims: Option<(u32, u32)>) -> bool {
        let dims = dims.unwrap_or_else(|| self.canvas.dimensions());
        if self.last.update((inputs.clone(), dims)).is_none() {
            return false;
        }
        self.redraw(inputs, dims);
        true
    }

    /// Unconditional clear-then-draw.
    pub fn redraw(&mut self, inputs: &OverlayInputs, dims: (u32, u32)) {
        let scene = self.compose(inputs, dims);
        trace!(shapes = scene.shapes.len(), width = dims.0, height = dims.1, "overlay redraw");
        raster::paint_scene(&mut self.canvas, &scene, &self.text);
        self.redraws += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    fn torso_landmarks() -> Landmarks {
        Landmarks::new(vec![
            Landmark::new(11, 100.0, 50.0, 0.0),
            Landmark::new(12, 200.0, 50.0, 0.0),
            Landmark::new(23, 200.0, 150.0, 0.0),
            Landmark::new(24, 100.0, 150.0, 0.0),
        ])
    }

    fn red_garment() -> GarmentRecommendation {
        GarmentRecommendation {
            id: 7,
            name: "Red Kurta".into(),
            category: "Ethnic".into(),
            color: Some("#ff0000".into()),
            match_percent: None,
        }
    }

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(OverlayStyle::default(), TextPainter::bitmap())
    }

    #[test]
    fn garment_quadrilateral_follows_torso_order() {
        let inputs = OverlayInputs { landmarks: torso_landmarks(), skin_roi: None, garment: Some(red_garment()) };
        let scene = renderer().compose(&inputs, (320, 240));

        let polygons: Vec<_> = scene.polygons().collect();
        assert_eq!(polygons.len(), 1);
        // 11 -> 12 -> 24 -> 23
        assert_eq!(
            polygons[0],
            &vec![
                Point::new(100.0, 50.0),
                Point::new(200.0, 50.0),
                Point::new(100.0, 150.0),
                Point::new(200.0, 150.0),
            ]
        );
        match &scene.shapes[0] {
            Shape::Polygon { fill, stroke, glow, .. } => {
                assert_eq!(*fill, Rgba([255, 0, 0, 0x66]));
                assert_eq!(*stroke, Rgba([255, 0, 0, 255]));
                assert_eq!(glow.map(|g| g.radius), Some(GARMENT_GLOW));
            }
            other => panic!("expected polygon first, got {other:?}"),
        }
    }

    #[test]
    fn missing_anchor_skips_garment_entirely() {
        let mut landmarks = torso_landmarks();
        landmarks.points.retain(|lm| lm.id != 24);
        let inputs = OverlayInputs { landmarks, skin_roi: None, garment: Some(red_garment()) };
        let scene = renderer().compose(&inputs, (320, 240));
        assert_eq!(scene.polygons().count(), 0);
        // skeleton still drawn for what is present
        assert_eq!(scene.count(|s| matches!(s, Shape::Disc { .. })), 3);
    }

    #[test]
    fn skeleton_has_four_joints_and_four_edges() {
        let inputs = OverlayInputs { landmarks: torso_landmarks(), ..Default::default() };
        let scene = renderer().compose(&inputs, (320, 240));
        assert_eq!(scene.count(|s| matches!(s, Shape::Disc { radius, .. } if *radius == 4.0)), 4);
        assert_eq!(scene.count(|s| matches!(s, Shape::Segment { width, .. } if *width == SKELETON_WIDTH)), 4);
        assert_eq!(scene.polygons().count(), 0);
    }

    #[test]
    fn garment_without_colour_uses_fallback() {
        let mut garment = red_garment();
        garment.color = None;
        let inputs = OverlayInputs { landmarks: torso_landmarks(), skin_roi: None, garment: Some(garment) };
        let scene = renderer().compose(&inputs, (320, 240));
        match &scene.shapes[0] {
            Shape::Polygon { stroke, .. } => assert_eq!(*stroke, Rgba([0x22, 0x22, 0x22, 255])),
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn roi_draws_without_landmarks() {
        let inputs = OverlayInputs {
            skin_roi: Some(SkinRoi::new(10.0, 10.0, 60.0, 40.0)),
            garment: Some(red_garment()),
            ..Default::default()
        };
        let scene = renderer().compose(&inputs, (320, 240));
        let cyan = Rgba([0, 0xf2, 0xff, 255]);
        assert_eq!(
            scene.shapes,
            vec![
                Shape::DashedRect {
                    min: Point::new(10.0, 10.0),
                    max: Point::new(60.0, 40.0),
                    dash: [3.0, 3.0],
                    width: 1.0,
                    color: cyan,
                },
                Shape::Polyline {
                    points: vec![Point::new(10.0, 16.0), Point::new(10.0, 10.0), Point::new(16.0, 10.0)],
                    width: 2.0,
                    color: cyan,
                },
                Shape::Label {
                    baseline: Point::new(10.0, 6.0),
                    text: "SKIN SCAN".into(),
                    size: 9.0,
                    color: cyan,
                },
            ]
        );
    }

    #[test]
    fn mirrored_layout_flips_x() {
        let style = OverlayStyle { mirror: true, ..OverlayStyle::default() };
        let renderer = OverlayRenderer::new(style, TextPainter::bitmap());
        let inputs = OverlayInputs {
            landmarks: Landmarks::new(vec![Landmark::new(0, 30.0, 20.0, 0.0)]),
            skin_roi: Some(SkinRoi::new(10.0, 10.0, 60.0, 40.0)),
            garment: None,
        };
        let scene = renderer.compose(&inputs, (100, 50));
        assert!(matches!(scene.shapes[0], Shape::Disc { center, .. } if center == Point::new(70.0, 20.0)));
        assert!(matches!(scene.shapes[1], Shape::DashedRect { min, max, .. }
            if min == Point::new(40.0, 10.0) && max == Point::new(90.0, 40.0)));
    }

    #[test]
    fn render_is_memoised_and_idempotent() {
        let mut r = renderer();
        let inputs = OverlayInputs {
            landmarks: torso_landmarks(),
            skin_roi: Some(SkinRoi::new(10.0, 10.0, 60.0, 40.0)),
            garment: Some(red_garment()),
        };
        assert!(r.render(&inputs, Some((320, 240))));
        assert_eq!(r.canvas().dimensions(), (320, 240));
        let first = r.canvas().clone();

        assert!(!r.render(&inputs, Some((320, 240))));
        assert!(!r.render(&inputs, None));
        assert_eq!(r.redraw_count(), 1);

        r.redraw(&inputs, (320, 240));
        assert_eq!(r.canvas(), &first);

        // clearing the landmarks leaves no skeleton pixels behind
        let cleared = OverlayInputs { landmarks: Landmarks::default(), ..inputs };
        assert!(r.render(&cleared, Some((320, 240))));
        assert_eq!(r.canvas().get_pixel(150, 100)[3], 0);

        assert!(r.render(&cleared, Some((640, 480))));
        assert_eq!(r.canvas().dimensions(), (640, 480));
    }

    #[test]
    fn far_peer_coordinates_render_within_canvas() {
        let mut state = PerceivedState::default();
        crate::state::PerceptionUpdate::parse(
            r#"{"skin_roi":[10,10,1e8,40],"landmarks":[[11,100,50,0],[12,1e9,50,0],[23,1e39,150,0]]}"#,
        )
        .unwrap()
        .apply_to(&mut state);

        let mut r = renderer();
        assert!(r.render(&OverlayInputs::from_state(&state, None), Some((640, 480))));
        assert_eq!(r.canvas().dimensions(), (640, 480));
        // shoulder line runs off the right edge, ROI dashes start at its corner
        assert_eq!(r.canvas().get_pixel(600, 50)[3], 255);
        assert_eq!(r.canvas().get_pixel(10, 10)[3], 255);
    }
}
