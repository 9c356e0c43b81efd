pub mod response;
pub mod types;

pub use response::ResponseBuilder;
pub use types::{AnalyzeRequest, AnalyzeResponse, AnalyzeSummary, Diagnostic, Resource};
