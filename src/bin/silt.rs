//! Interactive front end for SiltDB.
//!
//! Reads commands from stdin, one per line, and prints results to stdout.
//! Construction parameters map to flags; diagnostics go to stderr via
//! tracing, controlled with `RUST_LOG`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use siltdb::{repl, Config, Error, LsmTree};

#[derive(Parser, Debug)]
#[command(name = "silt")]
#[command(about = "A leveled LSM-tree key-value store")]
#[command(version)]
struct Args {
    /// Data directory for run files
    #[arg(long, default_value = "./siltdb")]
    dir: PathBuf,

    /// Write buffer capacity in entries
    #[arg(short, long, default_value_t = 1024)]
    buffer_capacity: usize,

    /// Number of on-disk levels
    #[arg(short, long, default_value_t = 5)]
    depth: usize,

    /// Per-level run count bound and size growth factor
    #[arg(short, long, default_value_t = 10)]
    fanout: usize,

    /// Worker threads for point and range reads
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Fraction of a level's run slots merged per compaction, in (0, 1]
    #[arg(short, long, default_value_t = 0.5)]
    merge_ratio: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::new(&args.dir)
        .buffer_capacity(args.buffer_capacity)
        .depth(args.depth)
        .fanout(args.fanout)
        .threads(args.threads)
        .merge_ratio(args.merge_ratio);

    let tree = match LsmTree::open(config) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!(error = %e, "failed to open tree");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = match repl::Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if let Err(e) = repl::execute(&tree, command, &mut stdout) {
            match e {
                // Bad input is reported and the session continues; anything
                // else is fatal.
                Error::InvalidInput(_) => eprintln!("{e}"),
                e => {
                    tracing::error!(error = %e, "fatal error");
                    std::process::exit(1);
                }
            }
        }
        let _ = stdout.flush();
    }
}
