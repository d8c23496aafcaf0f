pub mod cmd;
pub mod completion;
pub mod config;
pub mod error;
pub mod gh;
pub mod git;
pub mod jira;
pub mod llm;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod progress;

pub use config::Config;
pub use error::{Result, ShipmateError};
pub use llm::CommitMessage;
pub use pipeline::{
    run_pipeline, run_review, PipelineContext, PipelineOptions, PipelineOutcome, ReviewOptions,
};
