//! YAML configuration of an objective function client.
//!
//! ```yaml
//! setup:
//!   app: myapp
//!   baseurl: http://localhost:5000/api/
//!   study: quadratic
//!   scenario: first
//!   basedir: ${HOME}/objfun
//!   objfun: misfit
//! parameters:
//!   a: {type: float, value: 0, minv: -1, maxv: 1, resolution: 1e-6}
//!   n: {type: int, value: 1, minv: 0, maxv: 5, constant: true}
//! observations:
//!   obsA: 1.5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use of_types::{config_error, ObjFunResult, Parameter, ParameterSpec};
use serde::Deserialize;

use crate::codec::{MisfitCodec, ResidualCodec, SimObsCodec};
use crate::objective_function::{ObjectiveFunction, PendingRun};
use crate::proxy::{Proxy, Transport, DEFAULT_URL_BASE};
use crate::{ObjectiveFunctionMisfit, ObjectiveFunctionResidual, ObjectiveFunctionSimObs};

/// Name of the file holding app secrets.
pub const SECRETS_FILE: &str = ".objfun_secrets";

/// Which kind of objective function to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjFunKind {
    #[default]
    Misfit,
    Residual,
    SimObs,
}

fn default_baseurl() -> String {
    DEFAULT_URL_BASE.to_string()
}

/// The `setup` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupConfig {
    pub app: String,
    #[serde(default = "default_baseurl")]
    pub baseurl: String,
    pub study: String,
    pub scenario: String,
    pub basedir: PathBuf,
    #[serde(default)]
    pub objfun: ObjFunKind,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    setup: SetupConfig,
    #[serde(default)]
    parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    observations: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
struct SecretEntry {
    secret: Option<String>,
}

/// A validated client configuration.
#[derive(Debug, Clone)]
pub struct ObjFunConfig {
    config_dir: PathBuf,
    setup: SetupConfig,
    parameters: BTreeMap<String, Parameter>,
    observations: Vec<(String, f64)>,
}

impl ObjFunConfig {
    /// Read and validate the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> ObjFunResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::error!("no such configuration file {}", path.display());
            return Err(config_error!("no such configuration file {}", path.display()));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| config_error!("Failed to read config file {}: {e}", path.display()))?;
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml(&content, config_dir)
            .map_err(|e| config_error!("could not read configuration file {}: {e}", path.display()))
    }

    /// Parse a configuration whose relative paths resolve against `config_dir`.
    pub fn from_yaml(content: &str, config_dir: impl Into<PathBuf>) -> ObjFunResult<Self> {
        let raw: RawConfig = serde_yaml::from_str(&expand_env(content))
            .map_err(|e| config_error!("Failed to parse YAML config: {e}"))?;

        let mut errors = Vec::new();
        if raw.parameters.is_empty() {
            errors.push("section parameters is missing or empty".to_string());
        }
        let mut parameters = BTreeMap::new();
        for (name, spec) in &raw.parameters {
            match spec.build() {
                Ok(p) => {
                    parameters.insert(name.clone(), p);
                }
                Err(e) => errors.push(format!("parameter {name}: {e}")),
            }
        }

        let mut observations = Vec::new();
        for (name, target) in raw.observations.iter().flatten() {
            match (name.as_str(), target.as_f64()) {
                (Some(name), Some(target)) => observations.push((name.to_string(), target)),
                _ => errors.push(format!("observation {name:?} must map a name to a number")),
            }
        }
        if raw.setup.objfun == ObjFunKind::SimObs && observations.is_empty() {
            errors.push("section observations is required for simobs".to_string());
        }

        if !errors.is_empty() {
            for e in &errors {
                tracing::error!("{e}");
            }
            return Err(config_error!("invalid configuration: {}", errors.join("; ")));
        }

        Ok(Self {
            config_dir: config_dir.into(),
            setup: raw.setup,
            parameters,
            observations,
        })
    }

    pub fn setup(&self) -> &SetupConfig {
        &self.setup
    }

    pub fn app(&self) -> &str {
        &self.setup.app
    }

    pub fn baseurl(&self) -> &str {
        &self.setup.baseurl
    }

    pub fn study(&self) -> &str {
        &self.setup.study
    }

    pub fn scenario(&self) -> &str {
        &self.setup.scenario
    }

    pub fn objfun(&self) -> ObjFunKind {
        self.setup.objfun
    }

    /// Resolve `path` relative to the directory of the configuration file.
    pub fn expand_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn basedir(&self) -> PathBuf {
        self.expand_path(&self.setup.basedir)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// Observation targets in file order.
    pub fn observations(&self) -> &[(String, f64)] {
        &self.observations
    }

    pub fn observation_names(&self) -> Vec<String> {
        self.observations.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Look up the app secret next to the configuration file, then in the
    /// home directory.
    pub fn secret(&self) -> ObjFunResult<String> {
        let mut candidates = vec![self.expand_path(SECRETS_FILE)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(SECRETS_FILE));
        }
        for path in candidates.iter().filter(|p| p.is_file()) {
            tracing::debug!("reading secret from {}", path.display());
            let content = fs::read_to_string(path)?;
            let secrets: BTreeMap<String, SecretEntry> = serde_yaml::from_str(&content)
                .map_err(|e| config_error!("Failed to parse {}: {e}", path.display()))?;
            match secrets.get(self.app()) {
                Some(SecretEntry { secret: Some(secret) }) => return Ok(secret.clone()),
                Some(_) => tracing::warn!("could not find secret in [{}] in {}", self.app(), path.display()),
                None => tracing::warn!("could not find {} in {}", self.app(), path.display()),
            }
        }
        tracing::error!("no secret found for {}", self.app());
        Err(config_error!("no secret found for {}", self.app()))
    }

    /// Connect to the configured server and build the objective function.
    pub fn objective_function(&self) -> ObjFunResult<AnyObjectiveFunction> {
        let proxy = Proxy::connect(self.app(), &self.secret()?, self.baseurl())?;
        self.objective_function_with(Box::new(proxy))
    }

    /// Build the configured objective function on top of `transport`.
    pub fn objective_function_with(&self, transport: Box<dyn Transport>) -> ObjFunResult<AnyObjectiveFunction> {
        let study = self.study();
        let basedir = self.basedir();
        let parameters = self.parameters.clone();
        let objfun = match self.objfun() {
            ObjFunKind::Misfit => AnyObjectiveFunction::Misfit(
                ObjectiveFunction::new(transport, study, basedir, parameters, MisfitCodec::new())?
                    .with_scenario(self.scenario())?,
            ),
            ObjFunKind::Residual => AnyObjectiveFunction::Residual(
                ObjectiveFunction::new(transport, study, basedir, parameters, ResidualCodec::new())?
                    .with_scenario(self.scenario())?,
            ),
            ObjFunKind::SimObs => {
                let codec = SimObsCodec::new(self.observation_names());
                AnyObjectiveFunction::SimObs(
                    ObjectiveFunction::new(transport, study, basedir, parameters, codec)?
                        .with_scenario(self.scenario())?,
                )
            }
        };
        Ok(objfun)
    }
}

/// An objective function of the kind chosen in the configuration.
#[derive(Debug)]
pub enum AnyObjectiveFunction {
    Misfit(ObjectiveFunctionMisfit),
    Residual(ObjectiveFunctionResidual),
    SimObs(ObjectiveFunctionSimObs),
}

impl AnyObjectiveFunction {
    pub fn kind(&self) -> ObjFunKind {
        match self {
            Self::Misfit(_) => ObjFunKind::Misfit,
            Self::Residual(_) => ObjFunKind::Residual,
            Self::SimObs(_) => ObjFunKind::SimObs,
        }
    }

    pub fn study(&self) -> &str {
        match self {
            Self::Misfit(o) => o.study(),
            Self::Residual(o) => o.study(),
            Self::SimObs(o) => o.study(),
        }
    }

    pub fn get_new(&self, scenario: Option<&str>) -> ObjFunResult<PendingRun> {
        match self {
            Self::Misfit(o) => o.get_new(scenario),
            Self::Residual(o) => o.get_new(scenario),
            Self::SimObs(o) => o.get_new(scenario),
        }
    }
}

/// Expand `${VAR}` and `$VAR` references from the environment. Unknown
/// variables are left as written.
pub fn expand_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if is_var_name(&braced[..end]) => (&braced[..end], end + 2),
                _ => ("", 0),
            }
        } else {
            let end = after
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit()))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let value = if name.is_empty() {
            None
        } else {
            std::env::var(name).ok()
        };
        match value {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use of_types::ObjFunError;
    use serde_json::json;
    use tempfile::TempDir;

    const CONFIG: &str = "
setup:
  app: objfun-config-test-app
  study: quadratic
  scenario: first
  basedir: runs
parameters:
  a: {type: float, value: 0, minv: -1, maxv: 1}
  b: {type: float, value: 1, minv: 0, maxv: 2, resolution: 1.0e-7}
  n: {type: int, value: 2, minv: 0, maxv: 5, constant: true}
";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = ObjFunConfig::load(write(&dir, "objfun.yaml", CONFIG)).unwrap();
        assert_eq!(cfg.app(), "objfun-config-test-app");
        assert_eq!(cfg.baseurl(), DEFAULT_URL_BASE);
        assert_eq!(cfg.study(), "quadratic");
        assert_eq!(cfg.scenario(), "first");
        assert_eq!(cfg.objfun(), ObjFunKind::Misfit);
        assert_eq!(cfg.basedir(), dir.path().join("runs"));
        assert_eq!(cfg.parameters().len(), 3);
        assert!(cfg.parameters()["n"].constant());
        assert!(cfg.observations().is_empty());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            ObjFunConfig::load("/no/such/objfun.yaml"),
            Err(ObjFunError::Config(_))
        ));
    }

    #[test]
    fn missing_setup_entry() {
        let content = CONFIG.replace("  study: quadratic\n", "");
        assert!(matches!(
            ObjFunConfig::from_yaml(&content, "."),
            Err(ObjFunError::Config(_))
        ));
    }

    #[test]
    fn invalid_parameters_rejected() {
        let content = CONFIG.replace("value: 2, minv: 0", "value: 2.5, minv: 0");
        let err = ObjFunConfig::from_yaml(&content, ".").unwrap_err();
        assert!(err.to_string().contains("parameter n"));

        let content = CONFIG.replace("minv: -1, maxv: 1", "minv: 1, maxv: -1");
        assert!(ObjFunConfig::from_yaml(&content, ".").is_err());
    }

    #[test]
    fn simobs_needs_observations() {
        let content = CONFIG.replace("  basedir: runs\n", "  basedir: runs\n  objfun: simobs\n");
        assert!(ObjFunConfig::from_yaml(&content, ".").is_err());

        let content = format!("{content}observations:\n  obsB: 2.0\n  obsA: 1.5\n");
        let cfg = ObjFunConfig::from_yaml(&content, ".").unwrap();
        assert_eq!(cfg.objfun(), ObjFunKind::SimObs);
        assert_eq!(cfg.observation_names(), ["obsB", "obsA"]);
        assert_eq!(cfg.observations()[1], ("obsA".to_string(), 1.5));
    }

    #[test]
    fn environment_expansion() {
        std::env::set_var("OBJFUN_TEST_STUDY", "expanded");
        assert_eq!(expand_env("study: ${OBJFUN_TEST_STUDY}"), "study: expanded");
        assert_eq!(expand_env("$OBJFUN_TEST_STUDY/x"), "expanded/x");
        assert_eq!(expand_env("${OBJFUN_TEST_UNSET_VAR}"), "${OBJFUN_TEST_UNSET_VAR}");
        assert_eq!(expand_env("cost $5 and $"), "cost $5 and $");
        assert_eq!(expand_env("${unterminated"), "${unterminated");

        let content = CONFIG.replace("quadratic", "${OBJFUN_TEST_STUDY}");
        assert_eq!(ObjFunConfig::from_yaml(&content, ".").unwrap().study(), "expanded");
    }

    #[test]
    fn secret_next_to_config() {
        let dir = TempDir::new().unwrap();
        let cfg = ObjFunConfig::load(write(&dir, "objfun.yaml", CONFIG)).unwrap();
        assert!(matches!(cfg.secret(), Err(ObjFunError::Config(_))));

        write(&dir, SECRETS_FILE, "other: {secret: nope}\n");
        assert!(cfg.secret().is_err());

        write(
            &dir,
            SECRETS_FILE,
            "objfun-config-test-app:\n  secret: s3cret\nother: {secret: nope}\n",
        );
        assert_eq!(cfg.secret().unwrap(), "s3cret");
    }

    #[test]
    fn builds_configured_variant() {
        let dir = TempDir::new().unwrap();
        let content = CONFIG.replace("  basedir: runs\n", "  basedir: runs\n  objfun: residual\n");
        let cfg = ObjFunConfig::load(write(&dir, "objfun.yaml", &content)).unwrap();

        let transport = ScriptedTransport::new();
        transport
            .on("GET", "studies/quadratic/parameters", 404, json!(null))
            .on("POST", "create_study", 201, json!(null))
            .on("POST", "studies/quadratic/create_scenario", 201, json!(null));
        let objfun = cfg.objective_function_with(Box::new(transport.clone())).unwrap();
        assert_eq!(objfun.kind(), ObjFunKind::Residual);
        assert_eq!(objfun.study(), "quadratic");

        let scenario = transport.requests_to("studies/quadratic/create_scenario");
        assert_eq!(scenario[0].body, Some(json!({"name": "first", "runtype": "PATH"})));

        transport.on("POST", "studies/quadratic/scenarios/first/runs/with_state", 404, json!(null));
        assert!(matches!(objfun.get_new(None), Err(ObjFunError::NoNewRun)));
    }
}
