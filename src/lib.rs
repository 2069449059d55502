//! Career Coach: session workflow engine for mock interviews and career
//! assessments.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod generators;
pub mod llm;
pub mod locks;
pub mod pipeline;
pub mod reconstruct;
pub mod session;
pub mod store;

pub use engine::{
    Engine, OwnerAnalytics, RestartResponse, SessionSummary, SessionView, StartResponse,
    SubmitResponse,
};
pub use error::{Error, Result};
