//! Compiler configuration
//!
//! Small knobs for the driver, optionally loaded from a `rill.toml`:
//!
//! ```toml
//! [optimize]
//! constant-folding = false
//!
//! [output]
//! verbose = true
//! ```

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub optimize: OptimizeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeConfig {
    /// Run constant propagation over lowered CFGs. On by default.
    #[serde(default = "default_true", rename = "constant-folding")]
    pub constant_folding: bool,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        OptimizeConfig {
            constant_folding: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Print phrase sources alongside their types.
    #[serde(default)]
    pub verbose: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
    }
}
