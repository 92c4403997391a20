pub mod image_source;
pub mod openrouter; // OpenRouter vision model
pub mod prompt;
pub mod response_parser;
pub mod vision_service;

pub use image_source::{ImageSource, UploadBody, UploadedFile};
pub use openrouter::OpenRouterService;
pub use prompt::PromptBuilder;
pub use response_parser::{ParseIssue, ParsedAnalysis, ResponseParser};
pub use vision_service::VisionService;
