use std::fs;
use std::path::{Path, PathBuf};

use of_cache::ResultType;
use of_types::{protocol_error, ObjFunResult, RunType};
use rand::Rng;

use super::ResultCodec;

/// Placeholder length used until a real residual vector has been seen.
pub const DEFAULT_NUM_RESIDUALS: usize = 50;

/// Residual vector written to a JSON file; the run stores the file path.
#[derive(Debug, Clone, Default)]
pub struct ResidualCodec {
    num_residuals: Option<usize>,
}

impl ResidualCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_residuals(mut self, n: usize) -> Self {
        self.num_residuals = Some(n);
        self
    }

    /// Number of residuals, as last seen or the default.
    pub fn num_residuals(&self) -> usize {
        self.num_residuals.unwrap_or(DEFAULT_NUM_RESIDUALS)
    }

    pub fn file_name(dir: &Path, run_id: i64) -> PathBuf {
        dir.join(format!("residuals_{run_id}.json"))
    }
}

impl ResultCodec for ResidualCodec {
    type Output = Vec<f64>;

    fn run_type(&self) -> RunType {
        RunType::Path
    }

    fn result_type(&self) -> ResultType {
        ResultType::Text
    }

    fn placeholder(&mut self) -> Vec<f64> {
        let mut rng = rand::rng();
        (0..self.num_residuals()).map(|_| rng.random::<f64>()).collect()
    }

    fn decode(&mut self, value: &serde_json::Value) -> ObjFunResult<Vec<f64>> {
        let path = value
            .as_str()
            .ok_or_else(|| protocol_error!("expected a residuals path, got {value}"))?;
        let residuals: Vec<f64> = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.num_residuals = Some(residuals.len());
        Ok(residuals)
    }

    fn encode(&mut self, dir: &Path, run_id: i64, result: &Vec<f64>) -> ObjFunResult<serde_json::Value> {
        let path = Self::file_name(dir, run_id);
        fs::write(&path, serde_json::to_string(result)?)?;
        self.num_residuals = Some(result.len());
        tracing::debug!("wrote {} residuals to {}", result.len(), path.display());
        Ok(serde_json::Value::String(path.to_string_lossy().into_owned()))
    }
}
