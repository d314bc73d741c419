use eyre::{Result, WrapErr};
use std::collections::BTreeSet;
use std::path::Path;

/// Load the newline-delimited target list. Blank lines and `#` comments
/// are skipped; an empty result is a fatal error, raised before any
/// network activity.
pub fn load_targets(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read target list {}", path.display()))?;

    let targets: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();

    if targets.is_empty() {
        eyre::bail!("no targets found in {}", path.display());
    }

    log::debug!("[target] loaded: path={} targets={}", path.display(), targets.len());
    Ok(targets)
}

/// Parse a comma-separated port override into a sorted, de-duplicated
/// list. Every value must be an integer in [1, 65535].
pub fn parse_ports(raw: &str) -> Result<Vec<u16>> {
    let mut ports = BTreeSet::new();
    for piece in raw.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let value: u32 = piece
            .parse()
            .wrap_err_with(|| format!("invalid port: {}", piece))?;
        if !(1..=65535).contains(&value) {
            eyre::bail!("invalid port: {} (must be in 1..=65535)", value);
        }
        ports.insert(value as u16);
    }
    if ports.is_empty() {
        eyre::bail!("no ports given");
    }
    Ok(ports.into_iter().collect())
}
