use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "mailping", author, version, about, disable_version_flag = true)]
pub struct Cli {
    /// Override the default configuration file path
    #[arg(long, short, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Watch this account instead of the configured default
    #[arg(long, short, value_name = "ADDRESS")]
    pub account: Option<String>,

    /// Print the distinct senders of unseen messages and exit
    #[arg(long)]
    pub list_addresses: bool,

    /// Log progress at info level
    #[arg(long)]
    pub verbose: bool,

    /// Log protocol details at debug level
    #[arg(long)]
    pub debug: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Cli {
    /// Parses the process arguments. Help and version requests exit 0, every
    /// other parse failure exits 1.
    pub fn parse_or_exit_code() -> Result<Self, ExitCode> {
        Self::try_parse().map_err(|err| {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = err.print();
            code
        })
    }

    /// `RUST_LOG`, when set, takes precedence over this.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}
