//! Presentation helpers for dataset analysis reports.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::DatasetAnalysis;

/// The analyze endpoint answers either `{"analysis": {...}}` or the bare report.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnalysisEnvelope {
    Wrapped { analysis: DatasetAnalysis },
    Bare(DatasetAnalysis),
}

impl AnalysisEnvelope {
    pub fn into_analysis(self) -> DatasetAnalysis {
        match self {
            AnalysisEnvelope::Wrapped { analysis } => analysis,
            AnalysisEnvelope::Bare(analysis) => analysis,
        }
    }
}

/// One bar of a frequency chart.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBar {
    pub label: String,
    pub count: u64,
    /// Height relative to the tallest bar, 0-100.
    pub height_pct: f64,
}

/// Normalize counts against the largest bucket so the tallest bar is 100%.
///
/// An empty mapping yields no bars; an all-zero mapping yields 0% bars.
pub fn frequency_bars(frequencies: &BTreeMap<String, u64>) -> Vec<FrequencyBar> {
    let max = frequencies.values().copied().max().unwrap_or(0);
    frequencies
        .iter()
        .map(|(label, &count)| FrequencyBar {
            label: label.clone(),
            count,
            height_pct: if max == 0 {
                0.0
            } else {
                count as f64 / max as f64 * 100.0
            },
        })
        .collect()
}
