pub mod session;

pub use session::{AnalysisSession, TriggerOutcome};
