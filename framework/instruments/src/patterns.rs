//! Structural fingerprinting of response bodies.
//!
//! A [Fingerprint] is the type skeleton of a JSON value: field names, value types and nesting,
//! never the values themselves. Responses from one endpoint normally share a single shape, so a
//! new shape appearing next to an established one is reported as an anomaly. That usually means
//! schema drift or an error body being served with a success status.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chain_tunnel_core::prelude::PatternAnalysisFailure;
use chain_tunnel_summary_model::{AnomalySummary, PatternReport, PatternSummary};
use parking_lot::Mutex;
use serde_json::Value;

/// Nesting levels described by a fingerprint. Anything deeper collapses to [Fingerprint::MaxDepth].
pub const MAX_FINGERPRINT_DEPTH: usize = 3;

/// Example payloads retained for each observed fingerprint.
pub const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    String,
    Number,
    Boolean,
    Null,
    EmptyArray,
    MaxDepth,
    /// Described by the first element only.
    Array(Box<Fingerprint>),
    /// Keys in source order, so a reordered body is a different shape.
    Object(Vec<(String, Fingerprint)>),
}

impl Fingerprint {
    pub fn of(value: &Value) -> Self {
        Self::at_depth(value, 0)
    }

    fn at_depth(value: &Value, depth: usize) -> Self {
        if depth > MAX_FINGERPRINT_DEPTH {
            return Self::MaxDepth;
        }

        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(items) => match items.first() {
                Some(first) => Self::Array(Box::new(Self::at_depth(first, depth + 1))),
                None => Self::EmptyArray,
            },
            Value::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::at_depth(v, depth + 1)))
                    .collect(),
            ),
        }
    }

    /// The signature as a JSON value. Leaves are type tags.
    pub fn to_value(&self) -> Value {
        match self {
            Self::String => Value::from("string"),
            Self::Number => Value::from("number"),
            Self::Boolean => Value::from("boolean"),
            Self::Null => Value::from("null"),
            Self::EmptyArray => Value::from("empty_array"),
            Self::MaxDepth => Value::from("max_depth"),
            Self::Array(inner) => Value::Array(vec![inner.to_value()]),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[derive(Debug)]
struct PatternStats {
    fingerprint: Fingerprint,
    count: u64,
    examples: Vec<Value>,
}

#[derive(Debug, Default)]
struct EndpointPatterns {
    /// In first-seen order.
    patterns: Vec<PatternStats>,
    index: HashMap<Fingerprint, usize>,
}

impl EndpointPatterns {
    fn dominant_count_excluding(&self, fingerprint: &Fingerprint) -> u64 {
        self.patterns
            .iter()
            .filter(|p| &p.fingerprint != fingerprint)
            .map(|p| p.count)
            .max()
            .unwrap_or_default()
    }

    fn count_of(&self, fingerprint: &Fingerprint) -> u64 {
        self.index
            .get(fingerprint)
            .map(|i| self.patterns[*i].count)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct Anomaly {
    endpoint: String,
    fingerprint: Fingerprint,
    dominant_count: u64,
    example: Value,
}

#[derive(Debug, Default)]
struct AnalyzerState {
    endpoints: HashMap<String, EndpointPatterns>,
    anomalies: Vec<Anomaly>,
}

/// Tracks how often each response shape is seen per endpoint. Shared between every worker.
#[derive(Debug, Default)]
pub struct PatternAnalyzer {
    state: Mutex<AnalyzerState>,
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(value: &Value) -> Fingerprint {
        Fingerprint::of(value)
    }

    /// Record one occurrence of `fingerprint` for `endpoint`.
    ///
    /// Returns the anomaly when this is the first time the fingerprint is seen and the endpoint
    /// already has a different shape that has been seen more often.
    pub fn observe(
        &self,
        endpoint: &str,
        fingerprint: Fingerprint,
        example: &Value,
    ) -> Option<AnomalySummary> {
        let mut state = self.state.lock();
        let patterns = state.endpoints.entry(endpoint.to_string()).or_default();

        if let Some(i) = patterns.index.get(&fingerprint) {
            let stats = &mut patterns.patterns[*i];
            stats.count += 1;
            if stats.examples.len() < MAX_EXAMPLES {
                stats.examples.push(example.clone());
            }
            return None;
        }

        let dominant_count = patterns.dominant_count_excluding(&fingerprint);
        patterns
            .index
            .insert(fingerprint.clone(), patterns.patterns.len());
        patterns.patterns.push(PatternStats {
            fingerprint: fingerprint.clone(),
            count: 1,
            examples: vec![example.clone()],
        });

        if dominant_count > 1 {
            let anomaly = AnomalySummary {
                endpoint: endpoint.to_string(),
                key: fingerprint.to_string(),
                count: 1,
                dominant_count,
                example: example.clone(),
            };
            log::warn!(
                "New response shape for [{}] after {} responses of the established shape: {}",
                endpoint,
                dominant_count,
                anomaly.key
            );
            state.anomalies.push(Anomaly {
                endpoint: endpoint.to_string(),
                fingerprint,
                dominant_count,
                example: example.clone(),
            });
            return Some(anomaly);
        }

        None
    }

    /// Fingerprint and record a raw response body.
    pub fn observe_body(
        &self,
        endpoint: &str,
        body: &str,
    ) -> Result<Option<AnomalySummary>, PatternAnalysisFailure> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PatternAnalysisFailure::new(endpoint, e.to_string()))?;
        Ok(self.observe(endpoint, Fingerprint::of(&value), &value))
    }

    /// Observed shapes per endpoint, most frequent first, and the anomalies that are still a
    /// minority shape for their endpoint.
    pub fn report(&self) -> PatternReport {
        let state = self.state.lock();

        let patterns_by_endpoint = state
            .endpoints
            .iter()
            .map(|(endpoint, patterns)| {
                let mut summaries = patterns
                    .patterns
                    .iter()
                    .map(|p| PatternSummary {
                        key: p.fingerprint.to_string(),
                        fingerprint: p.fingerprint.to_value(),
                        count: p.count,
                        examples: p.examples.clone(),
                    })
                    .collect::<Vec<_>>();
                // Stable, so ties keep first-seen order
                summaries.sort_by(|a, b| b.count.cmp(&a.count));
                (endpoint.clone(), summaries)
            })
            .collect::<BTreeMap<_, _>>();

        let anomalies = state
            .anomalies
            .iter()
            .filter_map(|anomaly| {
                let patterns = state.endpoints.get(&anomaly.endpoint)?;
                let count = patterns.count_of(&anomaly.fingerprint);
                if count >= patterns.dominant_count_excluding(&anomaly.fingerprint) {
                    // Has since become the dominant shape
                    return None;
                }
                Some(AnomalySummary {
                    endpoint: anomaly.endpoint.clone(),
                    key: anomaly.fingerprint.to_string(),
                    count,
                    dominant_count: anomaly.dominant_count,
                    example: anomaly.example.clone(),
                })
            })
            .collect();

        PatternReport {
            patterns_by_endpoint,
            anomalies,
        }
    }
}
