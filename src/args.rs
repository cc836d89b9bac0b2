use clap::Parser;
use std::path::PathBuf;

/// Converts a brokerage 1099 CSV export into a TXF file for tax software.
/// The output is written next to the input, with a .TXF extension.
#[derive(Parser)]
#[clap(version, author)]
pub struct Opts {
    /// 1099 CSV export to convert
    pub input: PathBuf,

    #[clap(short, long)]
    pub quiet: bool,
    /// Verbose mode (-v, -vv, -vvv, etc)
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: usize,
    /// Timestamp (sec, ms, ns, none)
    #[clap(short, long)]
    pub ts: Option<stderrlog::Timestamp>,
}

pub fn parse_args() -> Opts {
    Opts::parse()
}
