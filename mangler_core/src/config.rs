use crate::rng::INPUT_SIZE_LIMIT;
use serde::Deserialize;
use std::path::PathBuf;

/// Settings that stay fixed for the duration of a mutation run.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MutateConfig {
    /// Upper bound for any growth operator, and the working buffer's cap.
    #[serde(default = "default_max_input_size")]
    pub max_input_size: usize,
    /// Baseline number of operator applications per run.
    #[serde(default = "default_mutations_per_run")]
    pub mutations_per_run: u64,
    /// Restrict every written byte to printable ASCII (32..=126).
    #[serde(default)]
    pub only_printable: bool,
    /// Consult the comparison-feedback dictionary when one is attached.
    #[serde(default)]
    pub cmp_feedback_enabled: bool,
}

pub fn default_max_input_size() -> usize {
    1024 * 1024
}

pub fn default_mutations_per_run() -> u64 {
    6
}

impl Default for MutateConfig {
    fn default() -> Self {
        Self {
            max_input_size: default_max_input_size(),
            mutations_per_run: default_mutations_per_run(),
            only_printable: false,
            cmp_feedback_enabled: false,
        }
    }
}

impl MutateConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: MutateConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_input_size == 0 {
            return Err(anyhow::anyhow!("max-input-size must be at least 1"));
        }
        if self.max_input_size > INPUT_SIZE_LIMIT {
            return Err(anyhow::anyhow!(
                "max-input-size {} exceeds the hard limit of {} bytes",
                self.max_input_size,
                INPUT_SIZE_LIMIT
            ));
        }
        Ok(())
    }
}
