use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Image MIME types the vision model accepts from us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
        }
    }

    /// Accepts either a MIME type ("image/png") or a bare extension ("jpg").
    pub fn from_declared(declared: &str) -> Option<Self> {
        let normalized = declared.trim().to_lowercase();
        let subtype = normalized.strip_prefix("image/").unwrap_or(&normalized);

        match subtype {
            "jpeg" | "jpg" | "pjpeg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "gif" => Some(ImageMime::Gif),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The one in-memory form every input source is normalized to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    bytes: Vec<u8>,
    mime_type: ImageMime,
}

impl CanonicalImage {
    /// Returns `None` for an empty buffer.
    pub fn new(bytes: Vec<u8>, mime_type: ImageMime) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(Self { bytes, mime_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> ImageMime {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Version of the prompt/parser contract. Bump together with any change to
/// section names or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVersion {
    V1,
}

impl PromptVersion {
    pub const CURRENT: PromptVersion = PromptVersion::V1;

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVersion::V1 => "v1",
        }
    }
}

/// One call's worth of input to the vision model.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    image: CanonicalImage,
    prompt_version: PromptVersion,
}

impl AnalysisRequest {
    pub fn new(image: CanonicalImage, prompt_version: PromptVersion) -> Self {
        Self {
            image,
            prompt_version,
        }
    }

    pub fn image(&self) -> &CanonicalImage {
        &self.image
    }

    pub fn prompt_version(&self) -> PromptVersion {
        self.prompt_version
    }
}

/// Named sections of the model reply, in the order the prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    MedicineName,
    SafetyRating,
    SideEffects,
    RecentStudies,
    Recommendations,
    UserStories,
    Alternatives,
    PriceRange,
    Availability,
}

impl Section {
    pub const ALL: [Section; 9] = [
        Section::MedicineName,
        Section::SafetyRating,
        Section::SideEffects,
        Section::RecentStudies,
        Section::Recommendations,
        Section::UserStories,
        Section::Alternatives,
        Section::PriceRange,
        Section::Availability,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Section::MedicineName => "Medicine Name",
            Section::SafetyRating => "Safety Rating",
            Section::SideEffects => "Side Effects",
            Section::RecentStudies => "Recent Studies",
            Section::Recommendations => "Recommendations",
            Section::UserStories => "User Stories",
            Section::Alternatives => "Alternatives",
            Section::PriceRange => "Price Range",
            Section::Availability => "Availability",
        }
    }

    /// Headings models commonly use instead of the exact title.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Section::MedicineName => &["Drug Name"],
            Section::SideEffects => &["Possible Side Effects"],
            Section::Recommendations => &["Usage Recommendations"],
            Section::UserStories => &["User Experiences", "User Reviews"],
            Section::Alternatives => &["Alternative Medicines"],
            _ => &[],
        }
    }

    /// One-word headings. These also start ordinary list items
    /// ("- Price: too high"), so they only count on undecorated lines.
    pub fn short_aliases(&self) -> &'static [&'static str] {
        match self {
            Section::MedicineName => &["Name"],
            Section::SafetyRating => &["Rating"],
            Section::RecentStudies => &["Studies", "Research"],
            Section::PriceRange => &["Price"],
            _ => &[],
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Section::SideEffects
                | Section::RecentStudies
                | Section::UserStories
                | Section::Alternatives
        )
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineAnalysis {
    pub name: String,
    pub rating: f64, // 0-10
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub studies: Vec<String>,
    #[serde(default)]
    pub user_stories: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub price_range: String,
    #[serde(default)]
    pub availability: String,
}

impl MedicineAnalysis {
    pub const MAX_RATING: f64 = 10.0;

    pub fn clamp_rating(rating: f64) -> f64 {
        if rating.is_nan() {
            return 0.0;
        }
        rating.clamp(0.0, Self::MAX_RATING)
    }
}

/// Which result tab the presentation layer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultTab {
    #[default]
    Info,
    Stories,
}

impl ResultTab {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(ResultTab::Info),
            "stories" => Some(ResultTab::Stories),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    CapturingPreview,
    Analyzing,
    Ready(MedicineAnalysis),
    Failed(ErrorKind),
}

impl SessionState {
    pub fn is_analyzing(&self) -> bool {
        matches!(self, SessionState::Analyzing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::CapturingPreview => write!(f, "capturing_preview"),
            SessionState::Analyzing => write!(f, "analyzing"),
            SessionState::Ready(_) => write!(f, "ready"),
            SessionState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

/// Everything the presentation layer needs to render the current screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub analysis: Option<MedicineAnalysis>, // last good result, kept across failures
    pub degraded: bool,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub tab: ResultTab,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            analysis: None,
            degraded: false,
            notice: None,
            error: None,
            tab: ResultTab::default(),
            updated_at: Utc::now(),
        }
    }
}
