use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How a probe failed. Rendered into the `error` field as
/// `<classification>: <detail>` so reports stay grep-able.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TcpUnreachable,
    ProtocolTimeout,
    ProtocolError,
    AuthFailed,
    Unhandled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TcpUnreachable => "tcp_unreachable",
            FailureKind::ProtocolTimeout => "protocol_timeout",
            FailureKind::ProtocolError => "protocol_error",
            FailureKind::AuthFailed => "auth_failed",
            FailureKind::Unhandled => "unhandled",
        }
    }
}

/// Outcome of probing one (target, port) work item. Built inside a check,
/// immutable once returned to the scheduler.
///
/// Invariant: `reachable == false` implies `fields` is empty and `error`
/// carries a reachability cause.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub target: String,
    pub port: u16,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
    pub reachable: bool,
    pub detected: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn new(target: &str, port: u16, service: &'static str) -> Self {
        Self {
            target: target.to_string(),
            port,
            service,
            timestamp: Utc::now(),
            reachable: false,
            detected: false,
            fields: Map::new(),
            error: None,
        }
    }

    /// Record a protocol-specific observation.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Record a classified failure. Does not touch `reachable` or any
    /// already-collected fields: a failed sub-step degrades the result, it
    /// does not abort it.
    pub fn record_failure(&mut self, kind: FailureKind, detail: &str) {
        self.error = Some(format!("{}: {}", kind.as_str(), detail));
    }

    pub fn field_is_true(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(Value::Bool(true)))
    }
}

/// A named predicate counted over all results at aggregation time. Each
/// service supplies its own set, so the aggregator needs no per-protocol
/// branching.
#[derive(Clone, Copy)]
pub struct ExposureCounter {
    pub name: &'static str,
    pub applies: fn(&CheckResult) -> bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub total_targets: usize,
    pub total_checks: usize,
    pub reachable: usize,
    pub detected: usize,
    #[serde(flatten)]
    pub exposures: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub service: &'static str,
    pub ports: Vec<u16>,
    pub summary: Summary,
    pub results: Vec<CheckResult>,
}

/// Reduce raw results into a report. Pure apart from the generation
/// timestamp: summary counts depend only on the result set, never on
/// completion order. Results are sorted by (target, port) so a fixed input
/// produces a deterministic document.
pub fn aggregate(
    service: &'static str,
    ports: &[u16],
    total_targets: usize,
    mut results: Vec<CheckResult>,
    counters: &[ExposureCounter],
) -> Report {
    results.sort_by(|a, b| a.target.cmp(&b.target).then(a.port.cmp(&b.port)));

    let exposures = counters
        .iter()
        .map(|c| {
            let count = results.iter().filter(|r| (c.applies)(r)).count();
            (c.name.to_string(), count)
        })
        .collect();

    let summary = Summary {
        total_targets,
        total_checks: results.len(),
        reachable: results.iter().filter(|r| r.reachable).count(),
        detected: results.iter().filter(|r| r.detected).count(),
        exposures,
    };

    log::debug!(
        "[report] aggregated: service={} checks={} reachable={} detected={}",
        service,
        summary.total_checks,
        summary.reachable,
        summary.detected
    );

    Report {
        generated_at: Utc::now(),
        service,
        ports: ports.to_vec(),
        summary,
        results,
    }
}

pub fn write_report(path: &Path, report: &Report) -> eyre::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    log::info!(
        "[report] written: path={} results={}",
        path.display(),
        report.results.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(target: &str, port: u16, reachable: bool, detected: bool) -> CheckResult {
        let mut r = CheckResult::new(target, port, "fake");
        r.reachable = reachable;
        r.detected = detected;
        if !reachable {
            r.record_failure(FailureKind::TcpUnreachable, "connection refused");
        }
        r
    }

    #[test]
    fn test_failure_classification_format() {
        let mut r = CheckResult::new("10.0.0.1", 23, "fake");
        r.record_failure(FailureKind::ProtocolTimeout, "read timed out");
        assert_eq!(r.error.as_deref(), Some("protocol_timeout: read timed out"));
    }

    #[test]
    fn test_unreachable_results_carry_no_fields() {
        let r = result("10.0.0.2", 1234, false, false);
        assert!(r.fields.is_empty());
        assert!(r.error.as_deref().unwrap().starts_with("tcp_unreachable"));
    }

    #[test]
    fn test_aggregate_counts_and_sorts() {
        // Concrete scenario: one reachable+detected target, one refused.
        let results = vec![
            result("10.0.0.2", 1234, false, false),
            result("10.0.0.1", 1234, true, true),
        ];
        let report = aggregate("fake", &[1234], 2, results, &[]);

        assert_eq!(report.summary.total_targets, 2);
        assert_eq!(report.summary.total_checks, 2);
        assert_eq!(report.summary.reachable, 1);
        assert_eq!(report.summary.detected, 1);
        assert_eq!(report.results[0].target, "10.0.0.1");
        assert!(report.results[0].reachable);
        assert_eq!(report.results[1].target, "10.0.0.2");
        assert!(report.results[1].error.as_deref().unwrap().starts_with("tcp_unreachable"));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = result("b", 2, true, false);
        let b = result("a", 1, true, true);
        let c = result("c", 3, false, false);

        let forward = aggregate("fake", &[1], 3, vec![a.clone(), b.clone(), c.clone()], &[]);
        let shuffled = aggregate("fake", &[1], 3, vec![c, a, b], &[]);

        assert_eq!(forward.summary, shuffled.summary);
        let forward_order: Vec<_> = forward.results.iter().map(|r| (&r.target, r.port)).collect();
        let shuffled_order: Vec<_> = shuffled.results.iter().map(|r| (&r.target, r.port)).collect();
        assert_eq!(forward_order, shuffled_order);
    }

    #[test]
    fn test_aggregate_sorts_ports_within_target() {
        let results = vec![
            result("a", 5901, true, false),
            result("a", 5800, true, false),
            result("b", 5800, false, false),
        ];
        let report = aggregate("fake", &[5800, 5901], 2, results, &[]);
        let order: Vec<_> = report.results.iter().map(|r| (r.target.as_str(), r.port)).collect();
        assert_eq!(order, vec![("a", 5800), ("a", 5901), ("b", 5800)]);
    }

    #[test]
    fn test_exposure_counters() {
        let mut exposed = result("a", 1, true, true);
        exposed.set("no_auth", true);
        let mut closed = result("b", 1, true, true);
        closed.set("no_auth", false);

        let counters = [ExposureCounter {
            name: "no_auth",
            applies: |r| r.field_is_true("no_auth"),
        }];
        let report = aggregate("fake", &[1], 2, vec![exposed, closed], &counters);
        assert_eq!(report.summary.exposures.get("no_auth"), Some(&1));
    }

    #[test]
    fn test_summary_serializes_flat() {
        let mut exposures = BTreeMap::new();
        exposures.insert("cpong_received".to_string(), 3);
        let summary = Summary {
            total_targets: 4,
            total_checks: 4,
            reachable: 3,
            detected: 3,
            exposures,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_checks"], 4);
        assert_eq!(json["cpong_received"], 3);
    }
}
