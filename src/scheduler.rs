use crate::checks::ProtocolCheck;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// One (target, port) unit of probing work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub target: String,
    pub port: u16,
}

/// Cross product of targets and ports, in stable input order.
pub fn work_items(targets: &[String], ports: &[u16]) -> Vec<WorkItem> {
    targets
        .iter()
        .flat_map(|target| {
            ports.iter().map(move |port| WorkItem {
                target: target.clone(),
                port: *port,
            })
        })
        .collect()
}

/// Drive one check over every work item with at most `concurrency` probes
/// in flight. Every item yields exactly one result: checks convert their
/// own failures into results per their contract, and a probe task that
/// panics anyway is caught here and turned into a synthetic `unhandled`
/// result. No retries; completion order is not preserved.
pub async fn run(
    items: Vec<WorkItem>,
    check: Arc<dyn ProtocolCheck>,
    timeouts: Timeouts,
    concurrency: usize,
) -> Vec<CheckResult> {
    let concurrency = concurrency.max(1);
    log::debug!(
        "[scheduler] run: service={} items={} concurrency={} connect_timeout={}ms io_timeout={}ms",
        check.name(),
        items.len(),
        concurrency,
        timeouts.connect.as_millis(),
        timeouts.io.as_millis()
    );

    stream::iter(items)
        .map(|item| {
            let check = Arc::clone(&check);
            let timeouts = timeouts.clone();
            async move {
                let handle = tokio::spawn({
                    let check = Arc::clone(&check);
                    let timeouts = timeouts.clone();
                    let item = item.clone();
                    async move { check.probe(&item.target, item.port, &timeouts).await }
                });
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!(
                            "[scheduler] probe_panicked: service={} target={} port={} error={}",
                            check.name(),
                            item.target,
                            item.port,
                            e
                        );
                        let mut result = CheckResult::new(&item.target, item.port, check.name());
                        result.record_failure(FailureKind::Unhandled, &e.to_string());
                        result
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await
}
