use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::result::ExperimentResult;

/// Local copy of an experiment run, next to what is sent to Langfuse
#[derive(Debug)]
pub struct ExperimentOutput {
    experiment_dir: PathBuf,
}

impl ExperimentOutput {
    /// Prepares `{output_dir}/{experiment-slug}`, replacing earlier results
    pub fn new(output_dir: &Path, experiment_name: &str) -> Result<Self> {
        let experiment_dir = output_dir.join(slug(experiment_name));

        fs::create_dir_all(&experiment_dir).with_context(|| {
            format!("Failed to create output directory {}", experiment_dir.display())
        })?;

        Ok(Self { experiment_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.experiment_dir
    }

    pub fn write_results(&self, result: &ExperimentResult) -> Result<()> {
        let json = serde_json::to_string_pretty(result)?;
        self.write_file("results.json", &json)
    }

    pub fn write_summary(&self, result: &ExperimentResult) -> Result<()> {
        self.write_file("summary.txt", &result.format())
    }

    pub fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.experiment_dir.join(name);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
