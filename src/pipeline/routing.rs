//! The routing predicate: given a session, decide what happens next.

use serde::{Deserialize, Serialize};

use crate::session::{Session, Stage};

/// Why `advance` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// The session needs more answers before it can move on.
    WaitForInput,
    /// Every stage is satisfied.
    Terminal,
}

/// Routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Run(Stage),
    Halt(HaltReason),
}

/// Pick the first unsatisfied stage of the session's pipeline.
///
/// The input gate is never run; reaching it unsatisfied halts with
/// `WaitForInput`. The live pipeline and the reconstructor both derive the
/// session's position from the same per-stage checks.
pub fn route(session: &Session) -> Route {
    let next = session
        .kind
        .pipeline()
        .iter()
        .find(|stage| !stage.is_satisfied(session));

    match next {
        None => Route::Halt(HaltReason::Terminal),
        Some(stage) if stage.is_input_gate() => Route::Halt(HaltReason::WaitForInput),
        Some(stage) => Route::Run(*stage),
    }
}
