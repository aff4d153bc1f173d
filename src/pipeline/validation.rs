//! Validation engine for Mapper specs.
//!
//! The engine runs every registered [`ValidationRule`] against a
//! [`MapperSpec`] and collects all diagnostics into a [`ValidationReport`]
//! instead of stopping at the first problem.
//!
//! ```rust,ignore
//! let report = ValidationEngine::with_defaults().validate(&spec);
//! for err in report.errors() {
//!     eprintln!("{err}");
//! }
//! ```

use serde::Serialize;

use super::errors::SpecError;
use super::spec::*;

// ─── Severity ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

// ─── Diagnostic ─────────────────────────────────────────────────────────────

/// One finding: an error or warning wrapping a [`SpecError`].
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: Severity,
    #[serde(flatten)]
    pub error: SpecError,
}

impl ValidationDiagnostic {
    pub fn error(err: SpecError) -> Self {
        Self {
            severity: Severity::Error,
            error: err,
        }
    }

    pub fn warning(err: SpecError) -> Self {
        Self {
            severity: Severity::Warning,
            error: err,
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &SpecError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| &d.error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SpecError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| &d.error)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// No errors (warnings are acceptable).
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ─── Rule trait ─────────────────────────────────────────────────────────────

/// A stateless check over a [`MapperSpec`].
pub trait ValidationRule: Send + Sync {
    /// Short, stable identifier (e.g. `"cover_params"`).
    fn name(&self) -> &str;

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic>;
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct ValidationEngine {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationEngine {
    /// An engine with no rules.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// An engine pre-loaded with the default rule set.
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(VersionRule));
        engine.add_rule(Box::new(FilterParamsRule));
        engine.add_rule(Box::new(CoverParamsRule));
        engine.add_rule(Box::new(ClustererParamsRule));
        engine.add_rule(Box::new(RuntimeLimitsRule));
        engine.add_rule(Box::new(GraphParamsRule));
        engine.add_rule(Box::new(UnknownFieldsRule));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, spec: &MapperSpec) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            report.diagnostics.extend(rule.validate(spec));
        }
        report
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Concrete rules
// ═══════════════════════════════════════════════════════════════════════════

// ─── 1. supported version ───────────────────────────────────────────────────

struct VersionRule;

impl ValidationRule for VersionRule {
    fn name(&self) -> &str {
        "version"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        if spec.v == SPEC_VERSION {
            return Vec::new();
        }
        vec![ValidationDiagnostic::error(
            SpecError::configuration("/v", format!("unsupported spec version {}", spec.v))
                .with_hint(format!("Set \"v\": {SPEC_VERSION}")),
        )]
    }
}

// ─── 2. filter parameters ───────────────────────────────────────────────────

struct FilterParamsRule;

impl ValidationRule for FilterParamsRule {
    fn name(&self) -> &str {
        "filter_params"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        match spec.filter_spec() {
            Some(FilterSpec::Projection { columns }) if columns.is_empty() => {
                vec![ValidationDiagnostic::error(SpecError::configuration(
                    "/filter/columns",
                    "projection needs at least one column",
                ))]
            }
            Some(FilterSpec::Norm { p }) if p.is_nan() || *p < 1.0 => {
                vec![ValidationDiagnostic::error(
                    SpecError::configuration("/filter/p", format!("norm order must be >= 1, got {p}"))
                        .with_hint("Use 1.0 (Manhattan) or 2.0 (Euclidean)"),
                )]
            }
            _ => Vec::new(),
        }
    }
}

// ─── 3. cover parameters ────────────────────────────────────────────────────

struct CoverParamsRule;

impl ValidationRule for CoverParamsRule {
    fn name(&self) -> &str {
        "cover_params"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        let Some(cover) = spec.cover_config() else {
            return Vec::new();
        };
        match cover.validate() {
            Ok(()) => Vec::new(),
            Err(err) => vec![ValidationDiagnostic::error(SpecError::invalid_cover(
                "/cover",
                err.to_string(),
            ))],
        }
    }
}

// ─── 4. clusterer parameters ────────────────────────────────────────────────

struct ClustererParamsRule;

impl ValidationRule for ClustererParamsRule {
    fn name(&self) -> &str {
        "clusterer_params"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        let mut out = Vec::new();
        match spec.clusterer_spec() {
            Some(ClustererSpec::Dbscan {
                eps, min_samples, ..
            }) => {
                if eps.is_nan() || *eps <= 0.0 {
                    out.push(ValidationDiagnostic::error(SpecError::configuration(
                        "/clusterer/eps",
                        format!("eps must be > 0, got {eps}"),
                    )));
                }
                if *min_samples == 0 {
                    out.push(ValidationDiagnostic::error(SpecError::configuration(
                        "/clusterer/min_samples",
                        "min_samples must be >= 1",
                    )));
                }
            }
            Some(ClustererSpec::FirstSimpleGap {
                relative_gap,
                max_fraction,
                ..
            }) => {
                if !(0.0..=1.0).contains(relative_gap) {
                    out.push(ValidationDiagnostic::error(SpecError::configuration(
                        "/clusterer/relative_gap",
                        format!("relative_gap must be in [0, 1], got {relative_gap}"),
                    )));
                }
                if max_fraction.is_nan() || *max_fraction <= 0.0 || *max_fraction > 1.0 {
                    out.push(ValidationDiagnostic::error(SpecError::configuration(
                        "/clusterer/max_fraction",
                        format!("max_fraction must be in (0, 1], got {max_fraction}"),
                    )));
                }
            }
            _ => {}
        }
        out
    }
}

// ─── 5. runtime limits ──────────────────────────────────────────────────────

struct RuntimeLimitsRule;

impl ValidationRule for RuntimeLimitsRule {
    fn name(&self) -> &str {
        "runtime_limits"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        if spec.runtime.max_region_runtime_ms == Some(0) {
            vec![ValidationDiagnostic::error(
                SpecError::configuration(
                    "/runtime/max_region_runtime_ms",
                    "max_region_runtime_ms must be > 0",
                )
                .with_hint("Omit the field to disable the per-region budget"),
            )]
        } else {
            Vec::new()
        }
    }
}

// ─── 6. graph parameters ────────────────────────────────────────────────────

struct GraphParamsRule;

impl ValidationRule for GraphParamsRule {
    fn name(&self) -> &str {
        "graph_params"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        if spec.graph.min_intersection == Some(0) {
            vec![ValidationDiagnostic::error(SpecError::configuration(
                "/graph/min_intersection",
                "min_intersection must be >= 1",
            ))]
        } else {
            Vec::new()
        }
    }
}

// ─── 7. unknown fields ──────────────────────────────────────────────────────

/// Unknown fields are errors in strict mode and warnings otherwise.
struct UnknownFieldsRule;

impl ValidationRule for UnknownFieldsRule {
    fn name(&self) -> &str {
        "unknown_fields"
    }

    fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
        let sections = [
            ("", Some(&spec.unknown_fields)),
            ("/filter", spec.filter.as_ref().map(|s| &s.unknown_fields)),
            ("/cover", spec.cover.as_ref().map(|s| &s.unknown_fields)),
            ("/clusterer", spec.clusterer.as_ref().map(|s| &s.unknown_fields)),
            ("/runtime", Some(&spec.runtime.unknown_fields)),
            ("/graph", Some(&spec.graph.unknown_fields)),
        ];

        let mut paths: Vec<String> = sections
            .into_iter()
            .filter_map(|(prefix, fields)| fields.map(|f| (prefix, f)))
            .flat_map(|(prefix, fields)| fields.keys().map(move |k| format!("{prefix}/{k}")))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let err = SpecError::configuration(path.clone(), format!("unknown field '{path}'"));
                if spec.strict {
                    ValidationDiagnostic::error(err)
                } else {
                    ValidationDiagnostic::warning(err)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error_code::ErrorCode;

    fn spec(json: &str) -> MapperSpec {
        MapperSpec::from_json(json).unwrap()
    }

    fn error_paths(report: &ValidationReport) -> Vec<&str> {
        report.errors().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_minimal_spec_is_valid() {
        let report = ValidationEngine::with_defaults().validate(&spec(r#"{"v":1}"#));
        assert!(report.is_valid());
        assert!(report.is_empty());
    }

    #[test]
    fn test_unsupported_version() {
        let report = ValidationEngine::with_defaults().validate(&spec(r#"{"v":2}"#));
        assert_eq!(error_paths(&report), vec!["/v"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let report = ValidationEngine::with_defaults().validate(&spec(
            r#"{
                "v": 1,
                "filter": { "type": "projection", "columns": [] },
                "clusterer": { "type": "dbscan", "eps": 0.0, "min_samples": 0 },
                "runtime": { "max_region_runtime_ms": 0 },
                "graph": { "min_intersection": 0 }
            }"#,
        ));
        assert_eq!(
            error_paths(&report),
            vec![
                "/filter/columns",
                "/clusterer/eps",
                "/clusterer/min_samples",
                "/runtime/max_region_runtime_ms",
                "/graph/min_intersection",
            ]
        );
    }

    #[test]
    fn test_cover_errors_use_cover_code() {
        let report = ValidationEngine::with_defaults().validate(&spec(
            r#"{"v":1,"cover":{"type":"uniform","n_intervals":0,"overlap_frac":0.1}}"#,
        ));
        let errors: Vec<&SpecError> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::InvalidCoverConfig);
        assert_eq!(errors[0].path, "/cover");
    }

    #[test]
    fn test_unknown_fields_warn_unless_strict() {
        let json = r#"{"v":1,"extra":1,"graph":{"weighted":true}}"#;
        let lenient = ValidationEngine::with_defaults().validate(&spec(json));
        assert!(lenient.is_valid());
        let warned: Vec<&str> = lenient.warnings().map(|w| w.path.as_str()).collect();
        assert_eq!(warned, vec!["/extra", "/graph/weighted"]);

        let mut strict = spec(json);
        strict.strict = true;
        let report = ValidationEngine::with_defaults().validate(&strict);
        assert_eq!(error_paths(&report), vec!["/extra", "/graph/weighted"]);
    }

    #[test]
    fn test_unknown_stage_fields_are_errors_when_strict() {
        let json = r#"{
            "v": 1,
            "strict": true,
            "filter": { "type": "norm", "q": 3 },
            "cover": { "type": "uniform", "n_intervals": 3, "overlap_frac": 0.2, "extend_outter": false },
            "clusterer": { "type": "dbscan", "eps": 2.0, "min_sampels": 1 }
        }"#;
        let report = ValidationEngine::with_defaults().validate(&spec(json));
        assert_eq!(
            error_paths(&report),
            vec!["/clusterer/min_sampels", "/cover/extend_outter", "/filter/q"]
        );
        assert!(report.errors().all(|e| e.code == ErrorCode::Configuration));

        let mut lenient = spec(json);
        lenient.strict = false;
        let report = ValidationEngine::with_defaults().validate(&lenient);
        assert!(report.is_valid());
        assert_eq!(report.warnings().count(), 3);
    }

    #[test]
    fn test_custom_rule() {
        struct RequireFilter;
        impl ValidationRule for RequireFilter {
            fn name(&self) -> &str {
                "require_filter"
            }
            fn validate(&self, spec: &MapperSpec) -> Vec<ValidationDiagnostic> {
                if spec.filter_spec().is_none() {
                    vec![ValidationDiagnostic::error(SpecError::configuration(
                        "/filter",
                        "a filter is required",
                    ))]
                } else {
                    Vec::new()
                }
            }
        }

        let mut engine = ValidationEngine::new();
        engine.add_rule(Box::new(RequireFilter));
        assert_eq!(engine.rule_names(), vec!["require_filter"]);
        assert!(engine.validate(&spec(r#"{"v":1}"#)).has_errors());
    }
}
