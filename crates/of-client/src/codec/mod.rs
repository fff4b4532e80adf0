//! Variant-specific handling of run results.
//!
//! A codec fixes the run type recorded with a scenario, the column type of
//! the local cache, how an in-progress placeholder is synthesised and how
//! results travel to and from the wire payload.

use std::fmt::Debug;
use std::path::Path;

use of_cache::ResultType;
use of_types::{LookupState, ObjFunResult, RunType};

use crate::proxy::Transport;

pub mod misfit;
pub mod residual;
pub mod simobs;

pub use misfit::MisfitCodec;
pub use residual::ResidualCodec;
pub use simobs::SimObsCodec;

/// Encoding and decoding of one kind of run result.
pub trait ResultCodec {
    type Output: Clone + Debug;

    fn run_type(&self) -> RunType;

    fn result_type(&self) -> ResultType;

    /// A random stand-in returned while a run has no final result.
    fn placeholder(&mut self) -> Self::Output;

    /// Decode the stored value of a completed run.
    fn decode(&mut self, value: &serde_json::Value) -> ObjFunResult<Self::Output>;

    /// Produce the stored value for a result of run `run_id`. File backed
    /// codecs write their payload below `dir`.
    fn encode(&mut self, dir: &Path, run_id: i64, result: &Self::Output) -> ObjFunResult<serde_json::Value>;

    /// Called once after the study was created remotely.
    fn create_study(&self, _study: &str, _transport: &dyn Transport) -> ObjFunResult<()> {
        Ok(())
    }

    /// Called once when attaching to an existing remote study.
    fn load_study(&self, _study: &str, _transport: &dyn Transport) -> ObjFunResult<()> {
        Ok(())
    }
}

/// A run together with its decoded (or placeholder) result.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult<T> {
    pub id: Option<i64>,
    pub state: LookupState,
    pub value: T,
}

impl<T> RunResult<T> {
    pub fn is_completed(&self) -> bool {
        self.state == LookupState::Completed
    }
}
