//! Launch parameters and runner settings

use crate::address::SuiteAddress;
use crate::error::{Error, Result};
use crate::model::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// JSON-encoded address restricting a run to one test.
pub const SUITE_ADDRESS_KEY: &str = "spectree_suite_address";

/// Present when this context is the isolated target of a parent run.
pub const ISOLATED_KEY: &str = "spectree_isolated";

/// Present when lifecycle events should not be reported.
pub const DISABLE_REPORTING_KEY: &str = "spectree_disable_reporting";

const KNOWN_KEYS: [&str; 3] = [SUITE_ADDRESS_KEY, ISOLATED_KEY, DISABLE_REPORTING_KEY];

/// Raw out-of-band parameters, as string pairs.
///
/// Flags are presence based: the value of a flag key is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchParams(BTreeMap<String, String>);

impl LaunchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn set_flag(&mut self, key: &str) {
        self.insert(key, "1");
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameters for a context that runs only the test at `address`.
    pub fn for_isolated(address: &SuiteAddress) -> Result<Self> {
        let mut params = Self::new();
        params.insert(SUITE_ADDRESS_KEY, address.encode()?);
        params.set_flag(ISOLATED_KEY);
        params.set_flag(DISABLE_REPORTING_KEY);
        Ok(params)
    }

    /// Pick the known keys out of environment-style pairs. Variable names are
    /// the upper-cased keys, e.g. `SPECTREE_ISOLATED`.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (name, value) in vars {
            let name = name.as_ref();
            if let Some(key) = KNOWN_KEYS.iter().find(|key| key.eq_ignore_ascii_case(name)) {
                params.insert(*key, value);
            }
        }
        params
    }

    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Environment variable pairs for handing these parameters to a child.
    pub fn env_vars(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.0.iter().map(|(k, v)| (k.to_ascii_uppercase(), v.clone()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LaunchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parsed launch configuration of one context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    pub suite_address: Option<SuiteAddress>,
    pub isolated: bool,
    pub disable_reporting: bool,
}

impl LaunchConfig {
    /// Run only `address`, reporting normally.
    pub fn solo(address: SuiteAddress) -> Self {
        Self {
            suite_address: Some(address),
            ..Default::default()
        }
    }

    pub fn from_params(params: &LaunchParams) -> Result<Self> {
        let suite_address = match params.get(SUITE_ADDRESS_KEY) {
            Some(encoded) => Some(SuiteAddress::decode(encoded).map_err(|e| Error::InvalidLaunchParam {
                key: SUITE_ADDRESS_KEY.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        let isolated = params.contains(ISOLATED_KEY);
        if isolated && suite_address.is_none() {
            return Err(Error::MissingAddress);
        }
        Ok(Self {
            suite_address,
            isolated,
            disable_reporting: params.contains(DISABLE_REPORTING_KEY),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_params(&LaunchParams::from_env())
    }

    pub fn to_params(&self) -> Result<LaunchParams> {
        let mut params = LaunchParams::new();
        if let Some(address) = &self.suite_address {
            params.insert(SUITE_ADDRESS_KEY, address.encode()?);
        }
        if self.isolated {
            params.set_flag(ISOLATED_KEY);
        }
        if self.disable_reporting {
            params.set_flag(DISABLE_REPORTING_KEY);
        }
        Ok(params)
    }
}

/// Runner settings, usually read from `spectree.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Timeout for tests that do not configure one
    pub default_timeout_ms: u64,

    /// How isolated contexts are started
    pub isolation: IsolationSettings,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            isolation: IsolationSettings::default(),
        }
    }
}

/// Program used to start isolated contexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationSettings {
    /// Program to execute; the current executable when unset
    pub program: Option<PathBuf>,

    /// Extra arguments passed to the program
    pub args: Vec<String>,
}

impl RunnerSettings {
    pub const FILE_NAME: &'static str = "spectree.toml";

    /// Load settings from file, falling back to defaults when it is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_params_round_trip() {
        let address = SuiteAddress::new(0, vec![1], 2);
        let params = LaunchParams::for_isolated(&address).unwrap();
        let launch = LaunchConfig::from_params(&params).unwrap();
        assert_eq!(launch.suite_address, Some(address));
        assert!(launch.isolated);
        assert!(launch.disable_reporting);
        assert_eq!(launch.to_params().unwrap(), params);
    }

    #[test]
    fn test_env_names_are_upper_cased_keys() {
        let params = LaunchParams::from_vars([
            ("SPECTREE_ISOLATED", ""),
            ("SPECTREE_SUITE_ADDRESS", r#"{"spec":0,"topic":[],"test":0}"#),
            ("PATH", "/usr/bin"),
        ]);
        assert!(params.contains(ISOLATED_KEY));
        assert!(!params.contains("path"));
        let vars: Vec<_> = params.env_vars().map(|(name, _)| name).collect();
        assert_eq!(vars, vec!["SPECTREE_ISOLATED", "SPECTREE_SUITE_ADDRESS"]);
    }

    #[test]
    fn test_bad_address_is_invalid_param() {
        let params: LaunchParams = [(SUITE_ADDRESS_KEY, "nope")].into_iter().collect();
        assert!(matches!(
            LaunchConfig::from_params(&params),
            Err(Error::InvalidLaunchParam { .. })
        ));
    }

    #[test]
    fn test_isolated_without_address_is_rejected() {
        let params: LaunchParams = [(ISOLATED_KEY, "1")].into_iter().collect();
        assert!(matches!(LaunchConfig::from_params(&params), Err(Error::MissingAddress)));
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RunnerSettings::FILE_NAME);
        assert_eq!(RunnerSettings::load(&path).unwrap(), RunnerSettings::default());

        let settings = RunnerSettings {
            default_timeout_ms: 250,
            isolation: IsolationSettings {
                program: Some(PathBuf::from("/bin/true")),
                args: vec!["--quiet".to_string()],
            },
        };
        settings.save(&path).unwrap();
        assert_eq!(RunnerSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: RunnerSettings = toml::from_str("[isolation]\nargs = [\"-q\"]\n").unwrap();
        assert_eq!(settings.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(settings.isolation.args, vec!["-q"]);
    }
}
