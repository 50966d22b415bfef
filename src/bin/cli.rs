//! durakv CLI
//!
//! Offline inspection of a transaction log.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use durakv::wal::{self, LogReader};

/// durakv CLI
#[derive(Parser, Debug)]
#[command(name = "durakv-cli")]
#[command(about = "Inspect durakv transaction logs")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every event in the log, in order
    Dump {
        /// Path to the transaction log
        path: PathBuf,
    },

    /// Check the log decodes cleanly and print a summary
    Verify {
        /// Path to the transaction log
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Commands::Dump { path } => dump(&path),
        Commands::Verify { path } => verify(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dump(path: &Path) -> durakv::Result<()> {
    let mut reader = LogReader::open(path)?;
    while let Some(event) = reader.next_event()? {
        println!("{}", event);
    }
    if reader.stats().truncated_tail {
        println!("(partial trailing record ignored)");
    }
    Ok(())
}

fn verify(path: &Path) -> durakv::Result<()> {
    let stats = wal::verify(path)?;
    println!("events:         {}", stats.events_read);
    println!("last sequence:  {}", stats.last_sequence);
    println!("truncated tail: {}", stats.truncated_tail);
    Ok(())
}
