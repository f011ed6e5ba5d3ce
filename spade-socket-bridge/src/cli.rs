//! Command-line contract for `spadeSocketBridge`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "spadeSocketBridge", disable_version_flag = true)]
pub struct Cli {
    /// Enable UBSI unit analysis (default off: SYSCALL records pass through unmodified)
    #[arg(short, long)]
    pub unit: bool,

    /// Read from a Unix-domain stream socket at PATH instead of standard input
    #[arg(short, long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Ignore termination signals; process until EOF
    #[arg(short, long = "wait-for-end")]
    pub wait_for_end: bool,
}
