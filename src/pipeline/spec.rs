//! Declarative Mapper specification.
//!
//! A [`MapperSpec`] names a filter, a cover, a clusterer, and the runtime and
//! graph options as plain JSON. It is checked by the
//! [`ValidationEngine`](super::validation::ValidationEngine) and turned into a
//! runnable pipeline by [`SpecPipelineBuilder`](super::spec_builder::SpecPipelineBuilder).
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "v": 1,
//!   "filter": { "type": "projection", "columns": [0] },
//!   "cover": { "type": "uniform", "n_intervals": 10, "overlap_frac": 0.3 },
//!   "clusterer": { "type": "dbscan", "eps": 0.5, "min_samples": 5 },
//!   "runtime": { "n_jobs": 4, "max_region_runtime_ms": 2000 },
//!   "graph": { "min_intersection": 1, "edge_strategy": "auto" },
//!   "noise_policy": "drop",
//!   "failure_policy": "skip",
//!   "strict": true
//! }
//! ```
//!
//! Every section is optional; omitted sections take the library defaults.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clustering::{ClusterFailurePolicy, Metric, NoisePolicy};
use crate::cover::CoverConfig;
use crate::errors::Result;
use crate::graph::EdgeStrategy;
use crate::types::MapperConfig;

/// The only spec version understood by this release.
pub const SPEC_VERSION: u32 = 1;

/// Top-level Mapper specification (v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperSpec {
    pub v: u32,

    /// Filter function; defaults to projection onto column 0.
    #[serde(default)]
    pub filter: Option<StageSection<FilterSpec>>,

    /// Cover policy; defaults to 10 uniform intervals with 10% overlap.
    #[serde(default)]
    pub cover: Option<StageSection<CoverConfig>>,

    /// Clustering procedure; defaults to DBSCAN(eps = 0.5, min_samples = 5).
    #[serde(default)]
    pub clusterer: Option<StageSection<ClustererSpec>>,

    #[serde(default)]
    pub runtime: RuntimeSpec,

    #[serde(default)]
    pub graph: GraphSpec,

    #[serde(default)]
    pub noise_policy: NoisePolicy,

    #[serde(default)]
    pub failure_policy: ClusterFailurePolicy,

    #[serde(default)]
    pub verbose: bool,

    /// If `true`, unrecognized fields are errors; otherwise warnings.
    #[serde(default)]
    pub strict: bool,

    /// Captures any fields not recognized by the schema.
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Default for MapperSpec {
    fn default() -> Self {
        Self {
            v: SPEC_VERSION,
            filter: None,
            cover: None,
            clusterer: None,
            runtime: RuntimeSpec::default(),
            graph: GraphSpec::default(),
            noise_policy: NoisePolicy::default(),
            failure_policy: ClusterFailurePolicy::default(),
            verbose: false,
            strict: false,
            unknown_fields: HashMap::new(),
        }
    }
}

impl MapperSpec {
    /// Parse a spec from JSON. Shape errors become `Serialization` errors;
    /// semantic checks happen at build time.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn filter_spec(&self) -> Option<&FilterSpec> {
        self.filter.as_ref().map(|s| &s.value)
    }

    pub fn cover_config(&self) -> Option<&CoverConfig> {
        self.cover.as_ref().map(|s| &s.value)
    }

    pub fn clusterer_spec(&self) -> Option<&ClustererSpec> {
        self.clusterer.as_ref().map(|s| &s.value)
    }

    /// The pipeline configuration this spec describes (not validated).
    pub fn to_config(&self) -> MapperConfig {
        let defaults = MapperConfig::default();
        MapperConfig {
            cover: self.cover_config().cloned().unwrap_or_default(),
            n_jobs: self.runtime.n_jobs.unwrap_or(defaults.n_jobs),
            verbose: self.verbose,
            noise_policy: self.noise_policy,
            failure_policy: self.failure_policy,
            max_region_runtime: self.runtime.max_region_runtime(),
            min_intersection: self
                .graph
                .min_intersection
                .unwrap_or(defaults.min_intersection),
            edge_strategy: self.graph.edge_strategy.unwrap_or_default(),
            store_edge_elements: self.graph.store_edge_elements,
        }
    }
}

// ─── Stage selections ───────────────────────────────────────────────────────

/// A stage section plus the keys its schema does not recognise.
///
/// Serde silently drops unknown keys inside internally tagged enums, and a
/// flattened catch-all map cannot sit next to one. The raw object is parsed,
/// then compared with what the section serializes back to; anything left
/// over is an unknown field.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSection<T> {
    pub value: T,
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl<T> StageSection<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            unknown_fields: HashMap::new(),
        }
    }
}

impl<T> From<T> for StageSection<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Serialize> Serialize for StageSection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut value = serde_json::to_value(&self.value).map_err(S::Error::custom)?;
        if let serde_json::Value::Object(map) = &mut value {
            for (key, extra) in &self.unknown_fields {
                map.entry(key.clone()).or_insert_with(|| extra.clone());
            }
        }
        value.serialize(serializer)
    }
}

impl<'de, T: Serialize + DeserializeOwned> Deserialize<'de> for StageSection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let value = T::deserialize(&raw).map_err(D::Error::custom)?;
        let known = serde_json::to_value(&value).map_err(D::Error::custom)?;

        let unknown_fields = match (raw, known) {
            (serde_json::Value::Object(raw), serde_json::Value::Object(known)) => raw
                .into_iter()
                .filter(|(key, _)| !known.contains_key(key))
                .collect(),
            _ => HashMap::new(),
        };
        Ok(Self {
            value,
            unknown_fields,
        })
    }
}

/// Built-in filter functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Select the given columns.
    Projection {
        #[serde(default = "default_columns")]
        columns: Vec<usize>,
    },
    /// Shannon entropy of the row read as a probability distribution.
    Entropy,
    /// `p`-norm of the row.
    Norm {
        #[serde(default = "default_p")]
        p: f64,
    },
}

fn default_columns() -> Vec<usize> {
    vec![0]
}

fn default_p() -> f64 {
    2.0
}

impl FilterSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projection { .. } => "projection",
            Self::Entropy => "entropy",
            Self::Norm { .. } => "norm",
        }
    }
}

/// Built-in clustering procedures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClustererSpec {
    /// Every region becomes one cluster.
    SingleCluster,
    Dbscan {
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
        #[serde(default)]
        metric: Metric,
    },
    FirstSimpleGap {
        #[serde(default = "default_relative_gap")]
        relative_gap: f64,
        #[serde(default = "default_max_fraction")]
        max_fraction: f64,
        #[serde(default)]
        metric: Metric,
    },
}

fn default_eps() -> f64 {
    0.5
}

fn default_min_samples() -> usize {
    5
}

fn default_relative_gap() -> f64 {
    0.3
}

fn default_max_fraction() -> f64 {
    1.0
}

impl ClustererSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleCluster => "single_cluster",
            Self::Dbscan { .. } => "dbscan",
            Self::FirstSimpleGap { .. } => "first_simple_gap",
        }
    }
}

// ─── Runtime / graph options ────────────────────────────────────────────────

/// Parallelism and time limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Clustering worker threads; `0` uses all logical cores. Default 1.
    #[serde(default)]
    pub n_jobs: Option<usize>,

    /// Per-region clustering budget in milliseconds.
    #[serde(default)]
    pub max_region_runtime_ms: Option<u64>,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl RuntimeSpec {
    pub fn max_region_runtime(&self) -> Option<Duration> {
        self.max_region_runtime_ms.map(Duration::from_millis)
    }
}

/// Edge construction options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub min_intersection: Option<usize>,

    #[serde(default)]
    pub edge_strategy: Option<EdgeStrategy>,

    #[serde(default)]
    pub store_edge_elements: bool,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}
