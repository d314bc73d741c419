use log::LevelFilter;
use std::io::Write;

/// Initialize logging to stderr so stdout stays machine-readable (the
/// summary JSON is printed there). Level comes from RUST_LOG, default INFO.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init()
}
