use std::path::Path;

use of_cache::ResultType;
use of_types::{protocol_error, ObjFunResult, RunType};
use rand::Rng;

use super::ResultCodec;

/// Scalar misfit stored directly with the run.
#[derive(Debug, Clone, Default)]
pub struct MisfitCodec;

impl MisfitCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ResultCodec for MisfitCodec {
    type Output = f64;

    fn run_type(&self) -> RunType {
        RunType::Misfit
    }

    fn result_type(&self) -> ResultType {
        ResultType::Real
    }

    fn placeholder(&mut self) -> f64 {
        100.0 * rand::rng().random::<f64>()
    }

    fn decode(&mut self, value: &serde_json::Value) -> ObjFunResult<f64> {
        value
            .as_f64()
            .ok_or_else(|| protocol_error!("expected a numeric misfit, got {value}"))
    }

    fn encode(&mut self, _dir: &Path, _run_id: i64, result: &f64) -> ObjFunResult<serde_json::Value> {
        Ok(serde_json::json!(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_in_range() {
        let mut codec = MisfitCodec::new();
        for _ in 0..100 {
            let v = codec.placeholder();
            assert!((0.0..100.0).contains(&v));
        }
    }

    #[test]
    fn decode_and_encode() {
        let mut codec = MisfitCodec::new();
        assert_eq!(codec.decode(&serde_json::json!(10)).unwrap(), 10.0);
        assert!(codec.decode(&serde_json::json!("10")).is_err());
        assert_eq!(
            codec.encode(Path::new("x"), 1, &10.0).unwrap(),
            serde_json::json!(10.0)
        );
        assert_eq!(codec.run_type(), RunType::Misfit);
        assert_eq!(codec.result_type(), ResultType::Real);
    }
}
