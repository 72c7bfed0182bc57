//! Locates, builds, runs and scores solutions in a Project Euler workspace.

mod batch;
mod harness;
mod locate;

pub use batch::{BatchRunner, BatchSummary};
pub use harness::{build_and_run, Job, JobFailure, RunOutcome};
pub use locate::{solution_file_name, Workspace, CPP_UTILS_DIR};
