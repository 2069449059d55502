//! Sessions, their event vocabulary and the pipeline stage tables.
//!
//! Session state is a pure fold over events. Nothing in this module touches
//! storage or content generation.

pub mod event;
pub mod model;
pub mod stage;

pub use event::{Event, EventRecord, EventRole, EventType, SystemMarker};
pub use model::{
    Analysis, AnalysisKind, Answer, ChoiceOption, Feedback, Payload, Prompt, Session,
    SessionContext, SessionId, SessionKind, SessionStatus,
};
pub use stage::Stage;
