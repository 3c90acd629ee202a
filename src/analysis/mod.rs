pub mod error;
pub mod extract;
pub mod image;
pub mod orchestrator;
pub mod preferences;
pub mod prompt;
pub mod service;
pub mod types;
pub mod validate;

pub use error::AnalysisError;
pub use service::{AnalysisReport, AnalysisSettings, SkinAnalysisService};
pub use types::{AnalysisRequest, ParsedAnalysis};
