//! Recognition benchmark: register a training set, verify a test set.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use facerec_recognition::{RecognitionEngine, Strategy};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Sample;

/// Outcome of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub strategy: String,
    pub threshold: f64,
    pub train_size: usize,
    pub test_size: usize,
    pub not_recognized: usize,
    pub wrong_label: usize,
    /// `(not_recognized + wrong_label) / test_size`.
    pub error_rate: f64,
    pub register_ms_per_face: f64,
    pub verify_ms_per_face: f64,
    /// label -> misses on that label's test faces
    pub misses_by_label: BTreeMap<String, usize>,
}

/// Registers `train` and then looks up every face of `test`.
pub fn run(
    engine: &RecognitionEngine,
    train: &[Sample],
    test: &[Sample],
    strategy: Strategy,
    threshold: f64,
) -> Result<BenchmarkReport> {
    let start = Instant::now();
    for sample in train {
        let mut identity = engine.new_identity(&sample.embedding);
        identity.set_label(&sample.label);
        engine.save_identity(identity)?;
    }
    let register_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(faces = train.len(), "training set registered");

    let start = Instant::now();
    let mut not_recognized = 0;
    let mut wrong_label = 0;
    let mut misses_by_label: BTreeMap<String, usize> = BTreeMap::new();
    for sample in test {
        match engine.find_identity(&sample.embedding, strategy, threshold) {
            None => {
                not_recognized += 1;
                *misses_by_label.entry(sample.label.clone()).or_default() += 1;
            }
            Some(found) if found.label() != Some(sample.label.as_str()) => {
                debug!(
                    want = %sample.label,
                    got = found.label().unwrap_or(""),
                    "wrong label"
                );
                wrong_label += 1;
                *misses_by_label.entry(sample.label.clone()).or_default() += 1;
            }
            Some(_) => {}
        }
    }
    let verify_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(BenchmarkReport {
        strategy: strategy.to_string(),
        threshold,
        train_size: train.len(),
        test_size: test.len(),
        not_recognized,
        wrong_label,
        error_rate: ratio(not_recognized + wrong_label, test.len()),
        register_ms_per_face: per_face(register_ms, train.len()),
        verify_ms_per_face: per_face(verify_ms, test.len()),
        misses_by_label,
    })
}

fn ratio(n: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { n as f64 / total as f64 }
}

fn per_face(ms: f64, n: usize) -> f64 {
    if n == 0 { 0.0 } else { ms / n as f64 }
}

/// Save report to file.
pub fn save_report(report: &BenchmarkReport, path: &Path) -> Result<()> {
    let data = serde_json::to_string_pretty(report)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Print benchmark summary.
pub fn print_summary(report: &BenchmarkReport) {
    println!("\n{}", "=".repeat(72));
    println!("RECOGNITION BENCHMARK ({} @ {})", report.strategy, report.threshold);
    println!("{}", "=".repeat(72));
    println!(
        "{:<24} {:>8}   ({:.3} ms/face)",
        "Registered", report.train_size, report.register_ms_per_face
    );
    println!(
        "{:<24} {:>8}   ({:.3} ms/face)",
        "Verified", report.test_size, report.verify_ms_per_face
    );
    println!("{:<24} {:>8}", "Not recognized", report.not_recognized);
    println!("{:<24} {:>8}", "Wrong label", report.wrong_label);
    println!("{:<24} {:>7.2}%", "Error rate", report.error_rate * 100.0);

    if !report.misses_by_label.is_empty() {
        println!("{}", "-".repeat(72));
        for (label, misses) in &report.misses_by_label {
            println!("  {:<22} {:>8}", label, misses);
        }
    }
    println!("{}", "-".repeat(72));
}
