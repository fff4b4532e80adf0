//! Client library for the ObjectiveFunction optimisation service.
//!
//! Optimisers evaluate an [`ObjectiveFunction`] at a parameter vector; the
//! evaluation is looked up in a remote run store shared by many worker
//! processes, which claim new runs with [`ObjectiveFunction::get_new`] and
//! upload their results with [`ObjectiveFunction::set_result`].

pub mod codec;
pub mod config;
pub mod objective_function;
pub mod proxy;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{MisfitCodec, ResidualCodec, ResultCodec, RunResult, SimObsCodec};
pub use config::{AnyObjectiveFunction, ObjFunConfig, ObjFunKind};
pub use objective_function::{compare_schema, Lookup, ObjectiveFunction, ParameterSet, PendingRun, Run};
pub use proxy::{ApiResponse, Proxy, RetryPolicy, Transport};

pub use of_cache::{CacheKey, CachedValue, ObjFunCache, ResultType};
pub use of_types::*;

/// Objective function storing a scalar misfit per run.
pub type ObjectiveFunctionMisfit = ObjectiveFunction<MisfitCodec>;

/// Objective function storing a residual vector per run.
pub type ObjectiveFunctionResidual = ObjectiveFunction<ResidualCodec>;

/// Objective function storing named simulated observations per run.
pub type ObjectiveFunctionSimObs = ObjectiveFunction<SimObsCodec>;
