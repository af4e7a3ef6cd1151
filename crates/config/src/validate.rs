//! Configuration validation.
//!
//! Checks a config file for syntax errors, unknown or misspelled fields,
//! type errors and settings the scheduler would reject at startup.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    env_subst::substitute_env,
    loader::parse_config_value,
    schema::{CadenceConfig, StorageBackend},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "scheduler.workers"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys with scalar values (e.g. `timeouts.actions`).
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "scheduler",
            Struct(HashMap::from([
                ("timezone", Leaf),
                ("workers", Leaf),
                ("idle_poll_secs", Leaf),
                ("shutdown_grace_secs", Leaf),
            ])),
        ),
        (
            "retry",
            Struct(HashMap::from([
                ("max_attempts", Leaf),
                ("base_backoff_ms", Leaf),
                ("max_backoff_ms", Leaf),
            ])),
        ),
        (
            "timeouts",
            Struct(HashMap::from([("default_secs", Leaf), ("actions", Map)])),
        ),
        (
            "storage",
            Struct(HashMap::from([("backend", Leaf), ("path", Leaf)])),
        ),
        (
            "actions",
            Struct(HashMap::from([
                ("http_timeout_secs", Leaf),
                ("user_agent", Leaf),
                ("write_file_dir", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file, or the discovered one when `path` is `None`.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults",
        )];
        diagnostics.extend(validate(&CadenceConfig::default()));
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let diagnostics = match std::fs::read_to_string(actual_path) {
        Ok(raw) => validate_str(&raw, actual_path),
        Err(e) => vec![Diagnostic::new(
            Severity::Error,
            "syntax",
            "",
            format!("failed to read config file: {e}"),
        )],
    };
    ValidationResult {
        diagnostics,
        config_path,
    }
}

/// Validate raw config text. `path` only selects the format by extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let value = match parse_config_value(&substitute_env(raw), path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("syntax error: {e}"),
            ));
            return diagnostics;
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<CadenceConfig>(value) {
        Ok(config) => diagnostics.extend(validate(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }
    diagnostics
}

/// Semantic checks on a parsed config.
#[must_use]
pub fn validate(config: &CadenceConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut error = |path: &str, message: String| {
        diagnostics.push(Diagnostic::new(Severity::Error, "value", path, message));
    };

    if let Some(tz) = &config.scheduler.timezone
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        error("scheduler.timezone", format!("unknown timezone \"{tz}\""));
    }
    if config.scheduler.workers == 0 {
        error("scheduler.workers", "must be at least 1".into());
    }
    if config.retry.max_attempts == 0 {
        error("retry.max_attempts", "must be at least 1".into());
    }
    if config.retry.base_backoff_ms > config.retry.max_backoff_ms {
        error(
            "retry.base_backoff_ms",
            format!(
                "base backoff ({}ms) exceeds max backoff ({}ms)",
                config.retry.base_backoff_ms, config.retry.max_backoff_ms
            ),
        );
    }
    if config.timeouts.default_secs == Some(0) {
        error("timeouts.default_secs", "must be greater than 0".into());
    }
    let mut zero_timeouts: Vec<&String> = config
        .timeouts
        .actions
        .iter()
        .filter(|&(_, secs)| *secs == 0)
        .map(|(action, _)| action)
        .collect();
    zero_timeouts.sort();
    for action in zero_timeouts {
        error(&format!("timeouts.actions.{action}"), "must be greater than 0".into());
    }
    if config.actions.http_timeout_secs == 0 {
        error("actions.http_timeout_secs", "must be greater than 0".into());
    }

    if config.storage.backend == StorageBackend::File && config.storage.path.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "storage.path",
            "file backend without a path; jobs are stored under the data directory",
        ));
    }
    if config.storage.backend == StorageBackend::Memory {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "storage.backend",
            "memory backend keeps nothing across restarts",
        ));
    }
    if let Some(dir) = &config.actions.write_file_dir
        && !dir.is_dir()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "file-ref",
            "actions.write_file_dir",
            format!("directory {} does not exist", dir.display()),
        ));
    }

    diagnostics
}

/// Walk the parsed value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        // Leaf, map or type mismatch: type errors are caught on deserialization.
        return;
    };

    let mut known_keys: Vec<&str> = fields.keys().copied().collect();
    known_keys.sort_unstable();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child_value, child_schema, &path, diagnostics),
            None => {
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn toml(raw: &str) -> Vec<Diagnostic> {
        validate_str(raw, Path::new("cadence.toml"))
    }

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("workers", "wokers", 1)]
    #[case("", "abc", 3)]
    #[case("same", "same", 0)]
    fn levenshtein_distances(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }

    #[test]
    fn defaults_are_valid() {
        let diags = validate(&CadenceConfig::default());
        assert!(diags.iter().all(|d| d.severity != Severity::Error), "{diags:?}");
    }

    #[test]
    fn unknown_field_with_suggestion() {
        let diags = toml("[scheduler]\nwokers = 2\n");
        let d = diags
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(d.path, "scheduler.wokers");
        assert!(d.message.contains("did you mean \"workers\""));
    }

    #[test]
    fn unknown_top_level_section() {
        let diags = toml("[retries]\nmax_attempts = 2\n");
        let d = diags
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert!(d.message.contains("\"retry\""));
    }

    #[test]
    fn action_timeout_keys_are_free_form() {
        let diags = toml("[timeouts.actions]\ncall_api = 5\nanything_else = 2\n");
        assert!(diags.iter().all(|d| d.category != "unknown-field"));
    }

    #[test]
    fn syntax_error_stops_early() {
        let diags = toml("[scheduler\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, "syntax");
    }

    #[test]
    fn type_error_reported() {
        let diags = toml("[retry]\nmax_attempts = \"three\"\n");
        assert!(diags.iter().any(|d| d.category == "type-error"));
    }

    #[rstest]
    #[case("[scheduler]\ntimezone = \"Mars/Olympus\"\n", "scheduler.timezone")]
    #[case("[scheduler]\nworkers = 0\n", "scheduler.workers")]
    #[case("[retry]\nmax_attempts = 0\n", "retry.max_attempts")]
    #[case("[retry]\nbase_backoff_ms = 10000\nmax_backoff_ms = 10\n", "retry.base_backoff_ms")]
    #[case("[timeouts]\ndefault_secs = 0\n", "timeouts.default_secs")]
    #[case("[timeouts.actions]\ncall_api = 0\n", "timeouts.actions.call_api")]
    fn semantic_errors(#[case] raw: &str, #[case] path: &str) {
        let diags = toml(raw);
        assert!(
            diags
                .iter()
                .any(|d| d.severity == Severity::Error && d.path == path),
            "{diags:?}"
        );
    }

    #[test]
    fn file_backend_without_path_warns() {
        let diags = toml("[storage]\nbackend = \"file\"\n");
        assert!(
            diags
                .iter()
                .any(|d| d.severity == Severity::Warning && d.path == "storage.path")
        );
    }

    #[test]
    fn yaml_is_validated_too() {
        let diags = validate_str("scheduler:\n  workrs: 3\n", Path::new("cadence.yaml"));
        assert!(diags.iter().any(|d| d.path == "scheduler.workrs"));
    }

    #[test]
    fn validate_file_reads_and_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(&path, "[scheduler]\nworkers = 0\n").unwrap();
        let result = validate_file(Some(&path));
        assert!(result.has_errors());
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn validate_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_file(Some(&dir.path().join("missing.toml")));
        assert!(result.has_errors());
    }
}
