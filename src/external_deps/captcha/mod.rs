//! Captcha solver integrations.
//!
//! The orchestrator only depends on [`CaptchaSolver`]. Two strategies ship
//! with the crate: [`ManualSolver`] asks a human, [`CommandSolver`] pipes the
//! image through an external OCR program.

mod command;
mod manual;

pub use command::CommandSolver;
pub use manual::{ManualSolver, SolveCallback};

use async_trait::async_trait;
use thiserror::Error;

/// Turns a challenge image into a best-effort answer.
///
/// Answers are guesses; the portal has the final word.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, image: &[u8]) -> Result<String, SolverError>;
}

/// Errors surfaced by solvers.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver unavailable: {0}")]
    Unavailable(String),
    #[error("solver i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver process failed: {0}")]
    Process(String),
    #[error("solver produced an empty answer")]
    EmptyAnswer,
}

/// Trim an answer and reject it when nothing is left.
pub(crate) fn non_empty(answer: &str) -> Result<String, SolverError> {
    let answer = answer.trim();
    if answer.is_empty() {
        Err(SolverError::EmptyAnswer)
    } else {
        Ok(answer.to_string())
    }
}
