//! This is the main entry point for the BMP recovery tool.
//!
//! The program opens a FAT32 image, recovers the BMP files it still holds and prints one
//! `<sha1>  <filename>` line per recovered file on stdout. Diagnostics go to stderr.

use fat_recov::commands::{Command, RecoverArgs, USAGE};
use fat_recov::traits::LayoutDisplay;
use fat_recov::Recovery;
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = match Command::from_args(std::env::args().skip(1)) {
        Command::Recover(args) => args,
        Command::Help => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Command::Invalid(msg) => {
            eprintln!("{msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = stderrlog::new()
        .module(module_path!())
        .module("fat_recov")
        .quiet(args.quiet)
        .verbosity(args.verbosity + 1)
        .init()
    {
        eprintln!("Failed to initialise logging: {err}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &RecoverArgs) -> Result<(), fat_recov::recovery::recovery_error::RecoveryError> {
    let recovery = Recovery::open(&args.image, args.config.clone())?;

    if args.layout {
        match recovery.vol().display_layout(3) {
            Ok(layout) => eprint!("{layout}"),
            Err(err) => error!("Print layout error: {err}"),
        }
    }

    let report = recovery.run(args.output.as_deref())?;
    for file in report.recovered() {
        println!("{file}");
    }

    Ok(())
}
