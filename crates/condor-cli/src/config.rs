//! Command-line flags and configuration-file loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use condor_pipeline::PipelineConfig;
use serde::Deserialize;

/// A distributed, extensible content-hunting pipeline.
#[derive(Debug, Parser)]
#[command(name = "condor", version, about)]
pub struct Cli {
    /// Load configuration from the specified file.
    #[arg(
        long = "config",
        env = "CONDOR_CONFIG",
        default_value = "config/condor.yaml"
    )]
    pub config: PathBuf,

    /// Logging filter used when RUST_LOG is unset.
    #[arg(long = "log-level", env = "CONDOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Configuration files namespace everything under a `condor:` key so they
/// can be merged into larger deployment manifests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamespacedConfig {
    condor: PipelineConfig,
}

/// Loads the pipeline configuration from a YAML file.
pub fn load(path: &Path) -> anyhow::Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let namespaced: NamespacedConfig =
        serde_yaml::from_str(&contents).context("could not parse configuration file")?;
    Ok(namespaced.condor)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_a_namespaced_pipeline_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
condor:
  modules:
    queue:
      driver: redis
      url: redis://127.0.0.1:6379/1
    my-pastebin:
      driver: pastebin
      interval: 30
    yara:
      driver: rules
      path: rules/index.yaml
    index:
      driver: elasticsearch
    notify:
      driver: webhook
      url: http://127.0.0.1:8080/hook
      min_score: 50
  inputs:
    modules: [my-pastebin]
  queues:
    module: queue
  scrapers:
    threads: 4
  processors:
    modules: [yara]
    threads: 2
  outputs:
    modules: [index, notify]
    threads: 2
"#,
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.scrapers.threads, 4);
        assert_eq!(config.inputs.modules, ["my-pastebin"]);
        assert_eq!(config.queues.module, "queue");
        assert_eq!(config.outputs.modules, ["index", "notify"]);
        assert_eq!(config.modules["my-pastebin"].driver, "pastebin");
        assert_eq!(config.modules["my-pastebin"].params["interval"], 30);
        assert_eq!(config.modules["notify"].params["min_score"], 50);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/condor.yaml")).is_err());
    }
}
