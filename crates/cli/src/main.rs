//! # silt — the SiltDB shell and server
//!
//! Without arguments this runs a REPL over stdin: read a command, execute
//! it against the store, print the response. With `serve` it binds a TCP
//! listener and speaks the same line protocol to remote clients.
//!
//! ## Commands
//!
//! ```text
//! p 10 100        Put key 10 -> 100
//! g 10            Get key 10
//! r 0 50          Range scan [0, 50)
//! d 10            Delete key 10
//! l "pairs.bin"   Load a binary pair file
//! s               Stats report
//! h               Help
//! q               Quit
//! ```
//!
//! ## Configuration
//!
//! All settings come from environment variables:
//!
//! ```text
//! SILT_DATA_DIR    data directory                (default: "data")
//! SILT_BUFFER_MB   write buffer budget in MiB    (default: 4)
//! SILT_ADDR        serve mode listen address     (default: "127.0.0.1:9090")
//! SILT_THREADS     serve mode worker threads     (default: available cores)
//! RUST_LOG         tracing filter                (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ silt
//! SiltDB started (data_dir=data, buffer=4MiB)
//! > p 1 100
//! Put successful: 1 -> 100
//! > g 1
//! 100
//! > q
//! bye
//! ```

mod command;
mod server;

use anyhow::Result;
use command::Outcome;
use engine::LsmTree;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to
/// `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(16)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let data_dir = env_or("SILT_DATA_DIR", "data");
    let buffer_mb: usize = env_or("SILT_BUFFER_MB", "4").parse().unwrap_or(4);

    let tree = LsmTree::open(&data_dir)?;
    tree.set_buffer_capacity(buffer_mb.max(1) * 1024 * 1024)?;

    let mode = std::env::args().nth(1);
    match mode.as_deref() {
        Some("serve") => {
            let addr = std::env::args()
                .nth(2)
                .unwrap_or_else(|| env_or("SILT_ADDR", "127.0.0.1:9090"));
            let threads: usize = env_or("SILT_THREADS", &default_thread_count().to_string())
                .parse()
                .unwrap_or_else(|_| default_thread_count());

            println!(
                "SiltDB serving on {} (data_dir={}, buffer={}MiB, threads={})",
                addr, data_dir, buffer_mb, threads
            );
            server::serve(Arc::new(tree), &addr, threads)
        }
        Some(other) => {
            eprintln!("unknown mode '{}' (usage: silt [serve [addr]])", other);
            std::process::exit(2);
        }
        None => repl(&tree),
    }
}

fn repl(tree: &LsmTree) -> Result<()> {
    println!(
        "SiltDB started (data_dir={}, buffer={}B)",
        env_or("SILT_DATA_DIR", "data"),
        tree.buffer_capacity()
    );
    println!("Commands: p k v | g k | r start end | d k | l \"path\" | s | h | q");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match command::execute(tree, &line) {
            Outcome::Reply(reply) => println!("{}", reply),
            Outcome::Quit => {
                println!("bye");
                break;
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
