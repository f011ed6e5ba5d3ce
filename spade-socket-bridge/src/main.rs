//! `spadeSocketBridge` — reorders and UBSI-analyzes a Linux Audit Subsystem
//! event stream for SPADE provenance capture.

mod assembler;
mod audit_line;
mod cli;
mod drain;
mod emitter;
mod engine;
mod line_reader;
mod reorder;
mod ubsi;

use std::process::ExitCode;

use clap::Parser;
use log::error;

use cli::Cli;
use drain::DrainController;
use engine::Engine;
use line_reader::LineReader;

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{err}");
                return ExitCode::SUCCESS;
            }
            eprint!("{err}");
            // The source exits -2 on an unrecognized option; `exit` truncates
            // to the low byte the same way a C `exit(-2)` would.
            std::process::exit(-2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let line_reader = match &args.socket {
        Some(path) => LineReader::connect_socket(path),
        None => Ok(LineReader::stdin()),
    };
    let line_reader = match line_reader {
        Ok(reader) => reader,
        Err(err) => {
            error!("failed to open input source: {err}");
            return ExitCode::FAILURE;
        }
    };

    let drain = match DrainController::install(args.wait_for_end) {
        Ok(drain) => drain,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    match Engine::new(line_reader, args.unit, drain).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
