//! Command implementations
//!
//! Commands print their results to stdout and return whether every run they
//! started succeeded; `main` turns that into the exit code.

pub mod list;
pub mod maintenance;
pub mod report;
pub mod run;
pub mod validate;

/// What a command reports back to `main`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn from_success(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}
