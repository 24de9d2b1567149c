//! Conversation analysis: model call, JSON repair and clinical mapping.
//!
//! `repair` and `mapper` are pure and never touch configuration or I/O.
//! `orchestrator` wires them behind an `LlmClient`.

pub mod types;
pub mod datetime;
pub mod repair;
pub mod fallback;
pub mod mapper;
pub mod sanitize;
pub mod prompt;
pub mod llm;
pub mod orchestrator;

pub use types::*;
pub use repair::*;
pub use fallback::*;
pub use mapper::*;
pub use sanitize::*;
pub use prompt::*;
pub use llm::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Language model endpoint unreachable at {0}")]
    LlmConnection(String),

    #[error("Language model returned error (status {status}): {body}")]
    LlmError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Language model returned no completion content")]
    EmptyCompletion,

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Input text too short for analysis (< 10 characters)")]
    InputTooShort,

    #[error("Analysis task failed: {0}")]
    TaskFailed(String),
}
