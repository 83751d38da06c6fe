//! Engine configuration and dataset loading.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use facerec_recognition::EngineConfig;
use serde::Deserialize;

/// Reads an [`EngineConfig`] from a YAML (or JSON) file.
///
/// Without a path the defaults are used.
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let data = std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: EngineConfig = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_slice(&data)?,
        _ => serde_yaml::from_slice(&data)
            .with_context(|| format!("parse config {}", path.display()))?,
    };
    Ok(cfg)
}

/// One line of a dataset file.
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    pub label: String,
    pub embedding: Vec<f32>,
}

/// Reads a JSON-lines dataset; blank lines are skipped.
pub fn load_dataset(path: &Path) -> Result<Vec<Sample>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read dataset {}", path.display()))?;
    parse_dataset(&data).with_context(|| format!("parse dataset {}", path.display()))
}

fn parse_dataset(data: &str) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: Sample =
            serde_json::from_str(line).with_context(|| format!("line {}", lineno + 1))?;
        if sample.label.is_empty() {
            anyhow::bail!("line {}: empty label", lineno + 1);
        }
        samples.push(sample);
    }
    Ok(samples)
}

/// Splits every label's samples in file order: sample `i` of a label with
/// `n` samples trains if `i < n * ratio`, otherwise it is held out.
pub fn split(samples: Vec<Sample>, ratio: f64) -> (Vec<Sample>, Vec<Sample>) {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for s in &samples {
        *totals.entry(s.label.clone()).or_default() += 1;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut train = Vec::new();
    let mut test = Vec::new();
    for s in samples {
        let i = seen.entry(s.label.clone()).or_default();
        let n = totals.get(&s.label).copied().unwrap_or(0);
        if (*i as f64) < n as f64 * ratio {
            train.push(s);
        } else {
            test.push(s);
        }
        *i += 1;
    }
    (train, test)
}
