use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = svcenum::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let cli = svcenum::cli::parse();

    if cli.list {
        for entry in svcenum::create_registry() {
            let ports: Vec<String> = entry
                .check
                .default_ports()
                .iter()
                .map(u16::to_string)
                .collect();
            println!("{:<16} {}", entry.check.name(), ports.join(","));
        }
        return Ok(());
    }

    // clap guarantees both are present when --list is absent.
    let service = cli.service.as_deref().unwrap_or_default();
    let input = cli.input.clone().unwrap_or_default();

    let entry = svcenum::lookup(service).ok_or_else(|| {
        eyre::eyre!(
            "unknown service '{}' (known: {})",
            service,
            svcenum::checks::service_names().join(", ")
        )
    })?;

    let targets = svcenum::load_targets(&input)?;
    let ports = match &cli.ports {
        Some(raw) => svcenum::parse_ports(raw).wrap_err("invalid --ports value")?,
        None => entry.check.default_ports().to_vec(),
    };
    let timeouts = svcenum::Timeouts::from_secs(cli.connect_timeout, cli.io_timeout);

    log::info!(
        "[main] enumeration_starting: service={} targets={} ports={:?} concurrency={}",
        entry.check.name(),
        targets.len(),
        ports,
        cli.concurrency
    );

    let items = svcenum::work_items(&targets, &ports);
    let results = svcenum::run(items, Arc::clone(&entry.check), timeouts, cli.concurrency).await;
    let report = svcenum::aggregate(
        entry.check.name(),
        &ports,
        targets.len(),
        results,
        &entry.counters,
    );

    let out_path = cli.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!("{}_enum_results.json", entry.check.name()))
    });
    svcenum::write_report(&out_path, &report)
        .wrap_err_with(|| format!("failed to write report to {}", out_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&report.summary)?);

    log::info!(
        "[main] enumeration_complete: service={} reachable={}/{} output={}",
        entry.check.name(),
        report.summary.reachable,
        report.summary.total_checks,
        out_path.display()
    );

    Ok(())
}
