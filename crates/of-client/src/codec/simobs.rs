use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use of_cache::ResultType;
use of_types::{config_error, protocol_error, ObjFunResult, RunType};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ResultCodec;
use crate::proxy::Transport;

/// Simulated observations keyed by observation name.
pub type SimObs = BTreeMap<String, f64>;

#[derive(Serialize, Deserialize)]
struct ObservationNames {
    obsnames: Vec<String>,
}

/// Named series of simulated observations written to a JSON file; the run
/// stores the file path.
#[derive(Debug, Clone)]
pub struct SimObsCodec {
    observation_names: Vec<String>,
}

impl SimObsCodec {
    pub fn new<S: Into<String>>(observation_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            observation_names: observation_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn observation_names(&self) -> &[String] {
        &self.observation_names
    }

    pub fn num_residuals(&self) -> usize {
        self.observation_names.len()
    }

    pub fn file_name(dir: &Path, run_id: i64) -> PathBuf {
        dir.join(format!("simobs_{run_id}.json"))
    }

    /// The series must cover exactly the configured observation names.
    pub fn check_simobs(&self, simobs: &SimObs) -> ObjFunResult<()> {
        let mut error = false;
        if simobs.len() != self.num_residuals() {
            tracing::error!("length of observations does not match");
            error = true;
        }
        for name in &self.observation_names {
            if !simobs.contains_key(name) {
                tracing::error!("observation {name} missing from simobs");
                error = true;
            }
        }
        if error {
            return Err(config_error!("observation names do not match"));
        }
        Ok(())
    }
}

impl ResultCodec for SimObsCodec {
    type Output = SimObs;

    fn run_type(&self) -> RunType {
        RunType::Path
    }

    fn result_type(&self) -> ResultType {
        ResultType::Text
    }

    fn placeholder(&mut self) -> SimObs {
        let mut rng = rand::rng();
        self.observation_names
            .iter()
            .map(|n| (n.clone(), rng.random::<f64>()))
            .collect()
    }

    fn decode(&mut self, value: &serde_json::Value) -> ObjFunResult<SimObs> {
        let path = value
            .as_str()
            .ok_or_else(|| protocol_error!("expected a simobs path, got {value}"))?;
        let simobs: SimObs = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.check_simobs(&simobs)?;
        Ok(simobs)
    }

    fn encode(&mut self, dir: &Path, run_id: i64, result: &SimObs) -> ObjFunResult<serde_json::Value> {
        self.check_simobs(result)?;
        let path = Self::file_name(dir, run_id);
        fs::write(&path, serde_json::to_string(result)?)?;
        Ok(serde_json::Value::String(path.to_string_lossy().into_owned()))
    }

    fn create_study(&self, study: &str, transport: &dyn Transport) -> ObjFunResult<()> {
        let body = serde_json::to_value(ObservationNames {
            obsnames: self.observation_names.clone(),
        })?;
        let response = transport.put(&format!("studies/{study}/observation_names"), &body)?;
        if response.status != 201 {
            return Err(response.into_error());
        }
        tracing::info!("registered {} observation names with study {study}", self.num_residuals());
        Ok(())
    }

    fn load_study(&self, study: &str, transport: &dyn Transport) -> ObjFunResult<()> {
        let response = transport.get(&format!("studies/{study}/observation_names"))?;
        if response.status != 200 {
            return Err(response.into_error());
        }
        let remote = response.json::<ObservationNames>()?.obsnames;

        let mut error = false;
        if remote.len() != self.num_residuals() {
            tracing::error!("number of simulated observations in {study} does not match");
            error = true;
        } else {
            for name in &remote {
                if !self.observation_names.contains(name) {
                    tracing::error!("observation name {name} missing from configuration");
                    error = true;
                }
            }
        }
        if error {
            return Err(config_error!("configuration does not match database"));
        }
        Ok(())
    }
}
