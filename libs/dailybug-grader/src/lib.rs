//! Grading core: harness generation, sandbox dispatch, transcript
//! interpretation and issue inference.
//!
//! Each stage is a pure function of its input; [`pipeline::Grader`] wires them
//! together for a single request.

pub mod dispatcher;
pub mod error;
pub mod harness;
pub mod interpreter;
pub mod issues;
pub mod pipeline;
pub mod problems;


pub use dispatcher::{dispatch, HttpSandbox, Sandbox};
pub use error::{DispatchError, GenerationError, GradeError, ProblemError};
pub use harness::{generate, HarnessPayload};
pub use interpreter::interpret;
pub use issues::{infer_issues_fixed, IssueKeywordTable};
pub use pipeline::{prepare_harness, Grader};
pub use problems::{FileProblemStore, ProblemCache, ProblemStore};
