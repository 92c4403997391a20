//! Medicine package scanner: photo in, structured safety/usage analysis out.
//!
//! `ImageSource` normalizes camera frames and uploads, `OpenRouterService`
//! sends them to a vision model with the `PromptBuilder` instruction,
//! `ResponseParser` turns the reply into a `MedicineAnalysis`, and
//! `AnalysisSession` runs the whole flow as a state machine the
//! presentation layer subscribes to.

pub mod api; // HTTP surface for the presentation layer
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{AnalysisError, ErrorKind};
pub use handlers::{AnalysisSession, TriggerOutcome};
pub use models::{
    AnalysisRequest, CanonicalImage, ImageMime, MedicineAnalysis, PromptVersion, ResultTab,
    Section, SessionSnapshot, SessionState,
};
