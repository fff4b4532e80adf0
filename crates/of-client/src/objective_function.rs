//! The client side of the ObjectiveFunction run protocol.
//!
//! An [`ObjectiveFunction`] binds a set of parameters to a remote study. It
//! maps parameter values onto their integer codes, asks the server for runs
//! matching those codes and keeps completed results in a per-scenario local
//! cache. What a result looks like is decided by its [`ResultCodec`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use of_cache::{CacheKey, CachedValue, ObjFunCache};
use of_types::{
    protocol_error, CacheError, LookupState, ObjFunError, ObjFunResult, Parameter, ParameterError,
    ParameterValue,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::codec::{ResultCodec, RunResult};
use crate::proxy::Transport;

/// Natural parameter values keyed by parameter name.
pub type ParameterSet = BTreeMap<String, ParameterValue>;

/// Name of the cache file inside a scenario directory.
pub const CACHE_FILE: &str = "cache.duckdb";

/// Tolerance for numeric fields when comparing parameter schemas.
const SCHEMA_TOLERANCE: f64 = 1e-12;

/// A run as reported by the server or the local cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Run {
    #[serde(default)]
    pub id: Option<i64>,
    pub state: LookupState,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Outcome of a run request: a run, or a status telling the caller why no
/// run exists yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Run(Run),
    Status(String),
}

/// A run handed out by [`ObjectiveFunction::get_with_state`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRun {
    pub id: i64,
    pub parameters: ParameterSet,
}

#[derive(Deserialize)]
struct WithStateResponse {
    id: i64,
    values: CacheKey,
}

#[derive(Deserialize)]
struct StateResponse {
    state: LookupState,
}

/// Objective function backed by the remote run store.
pub struct ObjectiveFunction<C: ResultCodec> {
    transport: Box<dyn Transport>,
    study: String,
    basedir: PathBuf,
    parameters: BTreeMap<String, Parameter>,
    active: Vec<String>,
    constant: Vec<String>,
    default_scenario: Option<String>,
    caches: HashMap<String, ObjFunCache>,
    codec: C,
}

impl<C: ResultCodec> ObjectiveFunction<C> {
    /// Attach to `study`, creating it remotely if it does not exist yet.
    ///
    /// An existing study must have been created with exactly the same
    /// parameters.
    pub fn new(
        transport: Box<dyn Transport>,
        study: impl Into<String>,
        basedir: impl Into<PathBuf>,
        parameters: BTreeMap<String, Parameter>,
        codec: C,
    ) -> ObjFunResult<Self> {
        if parameters.is_empty() {
            return Err(ObjFunError::EmptyParameterSet);
        }
        let (constant, active): (Vec<String>, Vec<String>) =
            parameters.keys().cloned().partition(|name| parameters[name].constant());

        let objfun = Self {
            transport,
            study: study.into(),
            basedir: basedir.into(),
            parameters,
            active,
            constant,
            default_scenario: None,
            caches: HashMap::new(),
            codec,
        };
        objfun.register_study()?;
        Ok(objfun)
    }

    /// Register `name` and make it the default scenario.
    pub fn with_scenario(mut self, name: &str) -> ObjFunResult<Self> {
        self.set_default_scenario(name)?;
        Ok(self)
    }

    fn register_study(&self) -> ObjFunResult<()> {
        let study = &self.study;
        let response = self.transport.get(&format!("studies/{study}/parameters"))?;
        match response.status {
            404 => {
                info!("creating study {study}");
                let body = json!({"name": study, "parameters": self.schema()?});
                let response = self.transport.post("create_study", &body)?;
                if response.status != 201 {
                    error!("creating study {study} failed");
                    return Err(response.into_error());
                }
                self.codec.create_study(study, self.transport.as_ref())
            }
            200 => {
                info!("loading study {study}");
                let remote: BTreeMap<String, Value> = response.json()?;
                let mismatches = compare_schema(&self.schema()?, &remote);
                if !mismatches.is_empty() {
                    for m in &mismatches {
                        error!("study {study}: {m}");
                    }
                    return Err(ObjFunError::Config(
                        "configuration does not match database".to_string(),
                    ));
                }
                self.codec.load_study(study, self.transport.as_ref())
            }
            _ => Err(response.into_error()),
        }
    }

    fn schema(&self) -> ObjFunResult<BTreeMap<String, Value>> {
        self.parameters
            .iter()
            .map(|(name, p)| Ok((name.clone(), serde_json::to_value(p.schema())?)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn study(&self) -> &str {
        &self.study
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn default_scenario(&self) -> Option<&str> {
        self.default_scenario.as_deref()
    }

    pub fn num_params(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_active_params(&self) -> usize {
        self.active.len()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// Names of the parameters an optimiser varies, in canonical order.
    pub fn active_parameters(&self) -> &[String] {
        &self.active
    }

    pub fn constant_parameters(&self) -> &[String] {
        &self.constant
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Lower bounds of the active parameters.
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.active_iter().map(|p| p.minv().as_f64()).collect()
    }

    /// Upper bounds of the active parameters.
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.active_iter().map(|p| p.maxv().as_f64()).collect()
    }

    fn active_iter(&self) -> impl Iterator<Item = &Parameter> {
        self.active.iter().filter_map(|name| self.parameters.get(name))
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    /// Register the scenario remotely and make it the default.
    pub fn set_default_scenario(&mut self, name: &str) -> ObjFunResult<()> {
        let body = json!({"name": name, "runtype": self.codec.run_type()});
        let response = self
            .transport
            .post(&format!("studies/{}/create_scenario", self.study), &body)?;
        match response.status {
            201 => info!("created scenario {name} of study {}", self.study),
            409 => debug!("scenario {name} already exists"),
            _ => return Err(response.into_error()),
        }
        self.default_scenario = Some(name.to_string());
        Ok(())
    }

    fn resolve_scenario(&self, scenario: Option<&str>) -> ObjFunResult<String> {
        scenario
            .or(self.default_scenario.as_deref())
            .map(str::to_string)
            .ok_or(ObjFunError::NoScenario)
    }

    /// Local directory of a scenario, created on demand.
    pub fn scenario_dir(&self, scenario: &str) -> ObjFunResult<PathBuf> {
        let dir = self.basedir.join(scenario);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn scenario_path(&self, scenario: &str, endpoint: &str) -> String {
        format!("studies/{}/scenarios/{scenario}/{endpoint}", self.study)
    }

    fn cache(&mut self, scenario: &str) -> ObjFunResult<&ObjFunCache> {
        match self.caches.entry(scenario.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let dir = self.basedir.join(scenario);
                fs::create_dir_all(&dir)?;
                let names: Vec<&str> = self.parameters.keys().map(String::as_str).collect();
                let cache = ObjFunCache::open(dir.join(CACHE_FILE), &names, self.codec.result_type())?;
                Ok(entry.insert(cache))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Parameter conversion
    // -----------------------------------------------------------------------

    /// Expand an optimiser vector into a parameter set.
    ///
    /// The vector holds either the active parameters or all parameters, in
    /// canonical order. Constants are always set to their fixed value.
    pub fn values_to_params(&self, values: &[f64]) -> ObjFunResult<ParameterSet> {
        let names: Vec<&String> = if values.len() == self.active.len() {
            self.active.iter().collect()
        } else if values.len() == self.parameters.len() {
            self.parameters.keys().collect()
        } else {
            return Err(ObjFunError::ArityMismatch {
                expected: self.active.len(),
                actual: values.len(),
            });
        };

        let mut params: ParameterSet = self
            .constant
            .iter()
            .filter_map(|name| self.parameters.get(name).map(|p| (name.clone(), p.value())))
            .collect();
        for (name, x) in names.into_iter().zip(values) {
            let value = match self.parameters.get(name) {
                Some(p) if p.constant() => continue,
                Some(p @ Parameter::Int(_)) => p.snap(ParameterValue::Float(*x))?,
                _ => ParameterValue::Float(*x),
            };
            params.insert(name.clone(), value);
        }
        Ok(params)
    }

    /// Flatten a parameter set into a vector in canonical order.
    pub fn params_to_values(&self, params: &ParameterSet, include_constant: bool) -> ObjFunResult<Vec<f64>> {
        let names: Vec<&String> = if include_constant {
            self.parameters.keys().collect()
        } else {
            self.active.iter().collect()
        };
        names
            .into_iter()
            .map(|name| self.value_of(name, params).map(|v| v.as_f64()))
            .collect()
    }

    fn value_of(&self, name: &str, params: &ParameterSet) -> ObjFunResult<ParameterValue> {
        let parameter = self
            .parameters
            .get(name)
            .ok_or_else(|| ParameterError::Unknown { name: name.to_string() })?;
        if parameter.constant() {
            return Ok(parameter.value());
        }
        params
            .get(name)
            .copied()
            .ok_or_else(|| ParameterError::Missing { name: name.to_string() }.into())
    }

    /// Map a parameter set onto its integer codes.
    pub fn transform_parameters(&self, params: &ParameterSet) -> ObjFunResult<CacheKey> {
        if let Some(name) = params.keys().find(|n| !self.parameters.contains_key(*n)) {
            return Err(ParameterError::Unknown { name: name.clone() }.into());
        }
        self.parameters
            .iter()
            .map(|(name, p)| {
                let value = self.value_of(name, params)?;
                Ok((name.clone(), p.transform(value)?))
            })
            .collect()
    }

    /// Map integer codes back onto natural parameter values.
    pub fn inverse_transform_parameters(&self, codes: &CacheKey) -> ObjFunResult<ParameterSet> {
        self.parameters
            .iter()
            .map(|(name, p)| {
                if p.constant() {
                    return Ok((name.clone(), p.value()));
                }
                let code = codes
                    .get(name)
                    .ok_or_else(|| ParameterError::Missing { name: name.clone() })?;
                Ok((name.clone(), p.inv_transform(*code)?))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Ask for the run matching `params`, serving completed runs from the
    /// local cache. Returns the lookup and whether it came from the cache.
    fn fetch(
        &mut self,
        endpoint: &str,
        params: &ParameterSet,
        scenario: &str,
    ) -> ObjFunResult<(Lookup, bool)> {
        let key = self.transform_parameters(params)?;
        match self.cache(scenario)?.get(&key) {
            Ok(hit) => {
                debug!("cache hit for run {}", hit.id);
                let run = Run {
                    id: Some(hit.id),
                    state: hit.state,
                    value: Some(hit.value.to_json()),
                };
                return Ok((Lookup::Run(run), true));
            }
            Err(CacheError::NotFound) => debug!("cache miss in scenario {scenario}"),
            Err(e) => return Err(e.into()),
        }

        let response = self
            .transport
            .post(&self.scenario_path(scenario, endpoint), &json!({"parameters": key}))?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let body: Value = response.json()?;
        if let Some(status) = body.get("status") {
            let status = status.as_str().map(str::to_string).unwrap_or_else(|| status.to_string());
            return Ok((Lookup::Status(status), false));
        }

        let run: Run = serde_json::from_value(body)?;
        if run.state == LookupState::Completed {
            if let (Some(id), Some(value)) = (run.id, &run.value) {
                let value = CachedValue::from_json(value, self.codec.result_type())?;
                self.cache(scenario)?.set(&key, id, value)?;
            }
        }
        Ok((Lookup::Run(run), false))
    }

    fn fetch_run(&mut self, params: &ParameterSet, scenario: &str) -> ObjFunResult<(Run, bool)> {
        match self.fetch("get_run", params, scenario)? {
            (Lookup::Run(run), cached) => Ok((run, cached)),
            (Lookup::Status(status), _) => Err(protocol_error!("get_run answered with status {status}")),
        }
    }

    /// Get the run for `params`, creating it remotely if necessary.
    pub fn get_run(&mut self, params: &ParameterSet, scenario: Option<&str>) -> ObjFunResult<Run> {
        let scenario = self.resolve_scenario(scenario)?;
        Ok(self.fetch_run(params, &scenario)?.0)
    }

    /// Look up the run for `params` without forcing its creation.
    pub fn lookup_run(&mut self, params: &ParameterSet, scenario: Option<&str>) -> ObjFunResult<Lookup> {
        let scenario = self.resolve_scenario(scenario)?;
        Ok(self.fetch("lookup_run", params, &scenario)?.0)
    }

    /// Look up the result for `params`.
    ///
    /// Runs without a final result carry a random placeholder so optimisers
    /// can keep iterating. A missing run is reported through the signal
    /// variants of [`ObjFunError`].
    pub fn get_result(
        &mut self,
        params: &ParameterSet,
        scenario: Option<&str>,
    ) -> ObjFunResult<RunResult<C::Output>> {
        match self.lookup_run(params, scenario)? {
            Lookup::Status(status) => Err(match status.as_str() {
                "waiting" => ObjFunError::Waiting,
                "provisional" => ObjFunError::PreliminaryRun,
                "new" => ObjFunError::NewRun,
                other => protocol_error!("unknown status {other}"),
            }),
            Lookup::Run(run) => {
                let value = if run.state == LookupState::Completed {
                    let stored = run
                        .value
                        .as_ref()
                        .ok_or_else(|| protocol_error!("completed run without value"))?;
                    self.codec.decode(stored)?
                } else {
                    self.codec.placeholder()
                };
                Ok(RunResult {
                    id: run.id,
                    state: run.state,
                    value,
                })
            }
        }
    }

    /// Take any run in `state`, moving it to `new_state` if given.
    pub fn get_with_state(
        &self,
        state: LookupState,
        new_state: Option<LookupState>,
        scenario: Option<&str>,
    ) -> ObjFunResult<PendingRun> {
        let scenario = self.resolve_scenario(scenario)?;
        let mut body = json!({"state": state});
        if let Some(new_state) = new_state {
            body["new_state"] = json!(new_state);
        }
        let response = self
            .transport
            .post(&self.scenario_path(&scenario, "runs/with_state"), &body)?;
        match response.status {
            404 => Err(ObjFunError::NotFound {
                what: format!("run in state {state}"),
            }),
            _ if response.is_success() => {
                let found: WithStateResponse = response.json()?;
                Ok(PendingRun {
                    id: found.id,
                    parameters: self.inverse_transform_parameters(&found.values)?,
                })
            }
            _ => Err(response.into_error()),
        }
    }

    /// Claim a new run for evaluation.
    pub fn get_new(&self, scenario: Option<&str>) -> ObjFunResult<PendingRun> {
        self.get_with_state(LookupState::New, Some(LookupState::Active), scenario)
            .map_err(|e| match e {
                ObjFunError::NotFound { .. } => ObjFunError::NoNewRun,
                e => e,
            })
    }

    pub fn get_state(&self, run_id: i64, scenario: Option<&str>) -> ObjFunResult<LookupState> {
        let scenario = self.resolve_scenario(scenario)?;
        let response = self
            .transport
            .get(&self.scenario_path(&scenario, &format!("runs/{run_id}/state")))?;
        match response.status {
            404 => Err(ObjFunError::NotFound {
                what: format!("run {run_id}"),
            }),
            _ if response.is_success() => Ok(response.json::<StateResponse>()?.state),
            _ => Err(response.into_error()),
        }
    }

    pub fn set_state(&self, run_id: i64, state: LookupState, scenario: Option<&str>) -> ObjFunResult<()> {
        let scenario = self.resolve_scenario(scenario)?;
        let response = self.transport.put(
            &self.scenario_path(&scenario, &format!("runs/{run_id}/state")),
            &json!({"state": state}),
        )?;
        match response.status {
            404 => Err(ObjFunError::NotFound {
                what: format!("run {run_id}"),
            }),
            _ if response.is_success() => Ok(()),
            _ => Err(response.into_error()),
        }
    }

    /// Upload the result for `params`.
    ///
    /// Unless `force` is set only an active run accepts a result. A forced
    /// overwrite of a completed run also replaces its cache entry, which
    /// the lookup itself may just have written.
    pub fn set_result(
        &mut self,
        params: &ParameterSet,
        result: &C::Output,
        force: bool,
        scenario: Option<&str>,
    ) -> ObjFunResult<()> {
        let scenario = self.resolve_scenario(scenario)?;
        let (run, cached) = self.fetch_run(params, &scenario)?;
        let run_id = run.id.ok_or_else(|| protocol_error!("run without id"))?;
        if !force && !run.state.accepts_result() {
            return Err(ObjFunError::InvalidRunState {
                run_id,
                state: run.state.to_string(),
            });
        }

        let dir = self.scenario_dir(&scenario)?;
        let value = self.codec.encode(&dir, run_id, result)?;
        let response = self.transport.put(
            &self.scenario_path(&scenario, &format!("runs/{run_id}/value")),
            &json!({"value": value, "force": force}),
        )?;
        match response.status {
            403 => return Err(ObjFunError::PermissionDenied { body: response.body }),
            _ if !response.is_success() => return Err(response.into_error()),
            _ => {}
        }
        info!("stored result of run {run_id} in scenario {scenario}");

        if cached || run.state == LookupState::Completed {
            let key = self.transform_parameters(params)?;
            let value = CachedValue::from_json(&value, self.codec.result_type())?;
            self.cache(&scenario)?.replace(&key, run_id, value)?;
        }
        Ok(())
    }

    /// Optimiser entry point: evaluate the objective at `x`.
    ///
    /// Only derivative-free optimisation is supported, so a non-empty
    /// gradient buffer is rejected.
    pub fn evaluate(&mut self, x: &[f64], grad: Option<&[f64]>) -> ObjFunResult<C::Output> {
        if let Some(grad) = grad.filter(|g| !g.is_empty()) {
            return Err(ObjFunError::UnsupportedGradient { len: grad.len() });
        }
        let params = self.values_to_params(x)?;
        Ok(self.get_result(&params, None)?.value)
    }
}

impl<C: ResultCodec> std::fmt::Debug for ObjectiveFunction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveFunction")
            .field("study", &self.study)
            .field("basedir", &self.basedir)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("default_scenario", &self.default_scenario)
            .finish_non_exhaustive()
    }
}

/// Compare a local parameter schema with the one stored remotely and
/// describe every difference.
pub fn compare_schema(local: &BTreeMap<String, Value>, remote: &BTreeMap<String, Value>) -> Vec<String> {
    let mut mismatches = Vec::new();
    if local.len() != remote.len() {
        mismatches.push(format!(
            "number of parameters does not match: {} local, {} remote",
            local.len(),
            remote.len()
        ));
        return mismatches;
    }
    for (name, remote_fields) in remote {
        let Some(local_fields) = local.get(name) else {
            mismatches.push(format!("parameter {name} missing from configuration"));
            continue;
        };
        let (Some(remote_fields), Some(local_fields)) = (remote_fields.as_object(), local_fields.as_object())
        else {
            mismatches.push(format!("parameter {name} is not described by an object"));
            continue;
        };
        for (key, remote_value) in remote_fields {
            match local_fields.get(key) {
                None => mismatches.push(format!("key {key} missing from configuration of parameter {name}")),
                Some(local_value) if !same_field(local_value, remote_value) => {
                    mismatches.push(format!("key {key} of parameter {name} does not match"))
                }
                Some(_) => {}
            }
        }
        for key in local_fields.keys().filter(|k| !remote_fields.contains_key(*k)) {
            mismatches.push(format!("key {key} of parameter {name} missing from database"));
        }
    }
    mismatches
}

fn same_field(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() <= SCHEMA_TOLERANCE,
        _ => a == b,
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::codec::MisfitCodec;
    use crate::testing::ScriptedTransport;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn objective(dir: &TempDir) -> ObjectiveFunction<MisfitCodec> {
        let parameters: BTreeMap<String, Parameter> = [
            ("a", Parameter::float(0.0, -1.0, 1.0, 1e-6).unwrap()),
            ("b", Parameter::float(1.0, 0.0, 2.0, 1e-7).unwrap().with_constant(true)),
            ("n", Parameter::int(0, -5, 5).unwrap()),
        ]
        .into_iter()
        .map(|(n, p)| (n.to_string(), p))
        .collect();
        let transport = ScriptedTransport::new();
        transport
            .on("GET", "studies/study/parameters", 404, json!(null))
            .on("POST", "create_study", 201, json!(null));
        ObjectiveFunction::new(Box::new(transport), "study", dir.path(), parameters, MisfitCodec::new())
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_values_to_params_inverts_params_to_values(
            a in -1.0f64..=1.0,
            n in -5.49f64..5.49
        ) {
            let dir = TempDir::new().unwrap();
            let objfun = objective(&dir);

            let params = objfun.values_to_params(&[a, n]).unwrap();
            prop_assert_eq!(objfun.params_to_values(&params, false).unwrap(), vec![a, n.round()]);
            prop_assert_eq!(objfun.params_to_values(&params, true).unwrap(), vec![a, 1.0, n.round()]);
            let values = objfun.params_to_values(&params, false).unwrap();
            prop_assert_eq!(objfun.values_to_params(&values).unwrap(), params.clone());

            let codes = objfun.transform_parameters(&params).unwrap();
            let back = objfun.inverse_transform_parameters(&codes).unwrap();
            prop_assert!((back["a"].as_f64() - a).abs() <= 1e-6);
            prop_assert_eq!(back["n"], params["n"]);
        }
    }
}
