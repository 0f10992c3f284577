//! Integrations that rely on things outside the crate.
//!
//! Currently this is the captcha solving capability: a human at a terminal
//! or an external OCR program.

pub mod captcha;

pub use captcha::{CaptchaSolver, CommandSolver, ManualSolver, SolverError};
