//! Search client output parsing
//!
//! The client prints its solution as plain lines and its performance data
//! as marker-prefixed lines: the first marker line is a comma-separated
//! header, the last one the matching comma-separated values. Optionally a
//! free-text marker such as `Actions used: 1,234.` carries the solution
//! length as well.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{BenchmarkConfig, LengthSource};

/// Failure to interpret client output
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("output must contain a header and a data line, found {found} metric line")]
    MissingDataLine { found: usize },
    #[error("mismatched number of header ({header}) and data ({data}) fields")]
    FieldCountMismatch { header: usize, data: usize },
    #[error("invalid value {value:?} for field {field:?} in data line {line:?}")]
    InvalidValue {
        field: String,
        value: String,
        line: String,
    },
}

/// Protocol settings for one client flavor
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    /// Prefix marking metric lines, e.g. `#` or `[client][message]`
    pub metric_prefix: String,
    /// Text preceding the solution length, e.g. `Actions used: `
    pub solution_marker: Option<String>,
    pub length_source: LengthSource,
    /// Metric name the marker value is stored under
    pub length_key: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            metric_prefix: "#".to_string(),
            solution_marker: None,
            length_source: LengthSource::Metric,
            length_key: "solutionlength".to_string(),
        }
    }
}

/// Metrics and solution recovered from one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub metrics: BTreeMap<String, f64>,
    pub solution: Vec<String>,
}

/// Parser for the client's stdout protocol
#[derive(Debug, Clone, Default)]
pub struct OutputParser {
    config: ParserConfig,
}

impl OutputParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parser configured from the benchmark document
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(ParserConfig {
            metric_prefix: config.metric_prefix.clone(),
            solution_marker: config.solution_marker.clone(),
            length_source: config.length_source,
            length_key: config.metric_keys.length.clone(),
        })
    }

    /// Parse the full stdout of a run
    pub fn parse(&self, stdout: &str) -> Result<ParsedOutput, ParseError> {
        let (metric_lines, solution) = self.split_lines(stdout);

        if metric_lines.is_empty() {
            return Ok(ParsedOutput {
                metrics: BTreeMap::new(),
                solution,
            });
        }

        if metric_lines.len() < 2 {
            return Err(ParseError::MissingDataLine {
                found: metric_lines.len(),
            });
        }

        let header_line = metric_lines[0];
        let data_line = metric_lines[metric_lines.len() - 1];

        let header: Vec<String> = header_line
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .collect();
        let data: Vec<&str> = data_line.split(',').map(str::trim).collect();

        if header.len() != data.len() {
            return Err(ParseError::FieldCountMismatch {
                header: header.len(),
                data: data.len(),
            });
        }

        let mut metrics = BTreeMap::new();
        for (field, value) in header.into_iter().zip(data) {
            // `nan` and `inf` parse as f64 but cannot be stored in a run file
            let parsed = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::InvalidValue {
                    field: field.clone(),
                    value: value.to_string(),
                    line: data_line.trim().to_string(),
                })?;
            metrics.insert(field, parsed);
        }

        if let Some(marker) = &self.config.solution_marker {
            if let Some(length) = parse_marker_length(stdout, marker) {
                self.merge_marker_length(&mut metrics, length);
            }
        }

        Ok(ParsedOutput { metrics, solution })
    }

    /// Solution lines only; never fails
    pub fn lenient_solution(&self, stdout: &str) -> Vec<String> {
        self.split_lines(stdout).1
    }

    fn split_lines<'a>(&self, stdout: &'a str) -> (Vec<&'a str>, Vec<String>) {
        let prefix = self.config.metric_prefix.as_str();
        let mut metric_lines = Vec::new();
        let mut solution = Vec::new();

        for line in stdout.split('\n') {
            let line = line.trim_end_matches('\r');
            match line.trim_start().strip_prefix(prefix) {
                Some(rest) => metric_lines.push(rest),
                None if !line.trim().is_empty() => solution.push(line.to_string()),
                None => {}
            }
        }

        (metric_lines, solution)
    }

    fn merge_marker_length(&self, metrics: &mut BTreeMap<String, f64>, length: u64) {
        let key = &self.config.length_key;
        let marker_value = length as f64;

        if let Some(existing) = metrics.get(key) {
            if *existing != marker_value {
                debug!(
                    metric = *existing,
                    marker = marker_value,
                    "solution length metric and marker disagree"
                );
            }
        }

        match self.config.length_source {
            LengthSource::Metric => {
                metrics.entry(key.clone()).or_insert(marker_value);
            }
            LengthSource::Marker => {
                metrics.insert(key.clone(), marker_value);
            }
        }
    }
}

/// Read the integer following `marker`, ignoring thousands separators
pub fn parse_marker_length(stdout: &str, marker: &str) -> Option<u64> {
    let start = stdout.find(marker)? + marker.len();
    let digits: String = stdout[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();

    digits.parse().ok()
}
