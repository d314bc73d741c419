use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "svcenum")]
#[command(about = "Safe service enumeration over a target list")]
pub struct Cli {
    /// Service to enumerate (see --list)
    #[arg(required_unless_present = "list")]
    pub service: Option<String>,

    /// Input file with one host or IP per line (# comments allowed)
    #[arg(short, long, required_unless_present = "list")]
    pub input: Option<PathBuf>,

    /// Output JSON report path (default: <service>_enum_results.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Comma-separated port override (default: the service's own ports)
    #[arg(short, long)]
    pub ports: Option<String>,

    /// Maximum concurrent probes
    #[arg(short, long, default_value = "20")]
    pub concurrency: usize,

    /// TCP connect timeout in seconds
    #[arg(long, default_value = "3")]
    pub connect_timeout: u64,

    /// Per-operation read/write timeout in seconds
    #[arg(long, default_value = "4")]
    pub io_timeout: u64,

    /// List known services and their default ports, then exit
    #[arg(long)]
    pub list: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
