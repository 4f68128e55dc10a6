/*!
Configuration for the provider registry.

[`RegistryConfig`] controls where provider modules are looked up.
[`ProviderConfig`] describes one provider declaratively so that a library
context can be set up from a configuration file.
*/

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_MODULES_DIR, MODULES_ENV};

/// Module search configuration of a library context
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RegistryConfig {
    /// Environment variable overriding the module directory
    pub modules_env: String,
    /// Directory used when the environment variable is unset
    pub default_module_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            modules_env: MODULES_ENV.to_string(),
            default_module_dir: PathBuf::from(DEFAULT_MODULES_DIR),
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different environment variable for the directory override
    pub fn with_modules_env(mut self, name: impl Into<String>) -> Self {
        self.modules_env = name.into();
        self
    }

    /// Use a different built-in module directory
    pub fn with_default_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_module_dir = dir.into();
        self
    }

    /// Current value of the environment override, if set
    pub fn env_module_dir(&self) -> Option<OsString> {
        std::env::var_os(&self.modules_env)
    }
}

/// Declarative description of one provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct ProviderConfig {
    /// Name the provider is registered under
    pub name: String,
    /// Explicit module path
    pub module: Option<PathBuf>,
    /// Whether the provider is a fallback provider
    pub fallback: bool,
    /// Whether to activate the provider right away
    pub activate: bool,
    /// Parameters handed to the provider's initializer
    pub parameters: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.module = Some(path.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }
}
