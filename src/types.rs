use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Pose keypoint ids as emitted by the perception service (MediaPipe numbering).
pub mod landmark_ids {
    pub const LEFT_SHOULDER: i32 = 11;
    pub const RIGHT_SHOULDER: i32 = 12;
    pub const LEFT_HIP: i32 = 23;
    pub const RIGHT_HIP: i32 = 24;
}

/// A 2D point in video-pixel space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A single pose keypoint. On the wire this is an `[id, x, y, z]` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i32, f32, f32, f32)", into = "(i32, f32, f32, f32)")]
pub struct Landmark {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(id: i32, x: f32, y: f32, z: f32) -> Self {
        Self { id, x, y, z }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<(i32, f32, f32, f32)> for Landmark {
    fn from((id, x, y, z): (i32, f32, f32, f32)) -> Self {
        Self { id, x, y, z }
    }
}

impl From<Landmark> for (i32, f32, f32, f32) {
    fn from(lm: Landmark) -> Self {
        (lm.id, lm.x, lm.y, lm.z)
    }
}

/// The landmark set of one frame. Not indexed by id: it may be empty,
/// incomplete or carry duplicate ids, and lookups scan for the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks {
    pub points: Vec<Landmark>,
}

impl Landmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn find(&self, id: i32) -> Option<&Landmark> {
        self.points.iter().find(|lm| lm.id == id)
    }

    /// Resolves every id in order, or `None` if any one is missing.
    pub fn resolve<const N: usize>(&self, ids: [i32; N]) -> Option<[Point; N]> {
        let mut out = [Point::default(); N];
        for (slot, id) in out.iter_mut().zip(ids) {
            *slot = self.find(id)?.point();
        }
        Some(out)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Skin sample rectangle, `[x1, y1, x2, y2]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct SkinRoi {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl SkinRoi {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<[f32; 4]> for SkinRoi {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<SkinRoi> for [f32; 4] {
    fn from(r: SkinRoi) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    Mesomorph,
    Ectomorph,
    Endomorph,
    #[serde(other)]
    Unknown,
}

impl BodyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyType::Mesomorph => "Mesomorph",
            BodyType::Ectomorph => "Ectomorph",
            BodyType::Endomorph => "Endomorph",
            BodyType::Unknown => "Unknown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BodyType::Mesomorph => "Muscular & Well-Built",
            BodyType::Ectomorph => "Lean & Tall Build",
            BodyType::Endomorph => "Solid & Strong Build",
            BodyType::Unknown => "Analyzing Body Frame...",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body metrics estimated by the perception service. Every field is
/// independently optional; `None` means "not yet estimated".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceivedMetrics {
    pub body_type: Option<BodyType>,
    #[serde(deserialize_with = "label_or_number")]
    pub height: Option<String>,
    pub ratio: Option<f32>,
    pub shoulder_width: Option<f32>,
    pub waist_width: Option<f32>,
    #[serde(deserialize_with = "label_or_number")]
    pub vibe_match: Option<String>,
}

// Labels such as height arrive either as "167 cm" or as a bare number.
fn label_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Label>::deserialize(deserializer)?.map(|label| match label {
        Label::Text(s) => s,
        Label::Number(n) => n.to_string(),
    }))
}

fn default_category() -> String {
    "Casual".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarmentRecommendation {
    pub id: u64,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, rename = "match", alias = "match_percent")]
    pub match_percent: Option<String>,
}

impl GarmentRecommendation {
    pub fn match_label(&self) -> &str {
        self.match_percent.as_deref().unwrap_or("90%")
    }
}

/// One suggested colour. The service sends either `{hex, name}` objects or bare names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaletteColor {
    pub hex: Option<String>,
    pub name: String,
}

impl<'de> Deserialize<'de> for PaletteColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Name(String),
            Entry { hex: Option<String>, name: String },
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Name(name) => PaletteColor { hex: None, name },
            Wire::Entry { hex, name } => PaletteColor { hex, name },
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    #[default]
    All,
    Formal,
    Casual,
    Ethnic,
}

impl CategoryFilter {
    pub const ALL: [CategoryFilter; 4] = [
        CategoryFilter::All,
        CategoryFilter::Formal,
        CategoryFilter::Casual,
        CategoryFilter::Ethnic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryFilter::All => "All",
            CategoryFilter::Formal => "Formal",
            CategoryFilter::Casual => "Casual",
            CategoryFilter::Ethnic => "Ethnic",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn admits(&self, garment: &GarmentRecommendation) -> bool {
        *self == CategoryFilter::All || garment.category == self.as_str()
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query string sent to the recommendation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationQuery {
    pub skin_tone: String,
    pub body_type: String,
    pub category: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecommendationResult {
    #[serde(default, rename = "recommendations")]
    pub garments: Vec<GarmentRecommendation>,
    #[serde(default, rename = "suggested_colors")]
    pub palette: Vec<PaletteColor>,
    #[serde(default)]
    pub body_advice: Option<String>,
}
