//! The line-oriented command language shared by the REPL and the TCP server.
//!
//! Commands are a single character followed by space-separated integer
//! arguments (the load command takes a quoted path instead):
//!
//! ```text
//! p [key] [value]     put
//! g [key]             get (prints nothing for a missing key)
//! r [start] [end]     range, start inclusive, end exclusive
//! d [key]             delete
//! l "[filepath]"      load a binary pair file
//! s                   stats
//! h                   help
//! q                   quit / disconnect
//! ```

use engine::LsmTree;
use std::fmt::Write as _;

/// Help text sent for `h`.
pub const HELP_TEXT: &str = r#"
SiltDB
======
Available commands:

p [key] [value]     - Put a key-value pair into the tree
g [key]             - Get the value associated with a key
r [start] [end]     - Range query for keys from start (inclusive) to end (exclusive)
d [key]             - Delete a key-value pair
l [filepath]        - Load key-value pairs from a binary file (path in quotes)
s                   - Print statistics about the tree
h                   - Show this help message
q                   - Disconnect
"#;

/// Stats responses larger than this are truncated.
const MAX_STATS_BYTES: usize = 8192;

/// What the caller should do with the connection after one command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Send this text back to the client.
    Reply(String),
    /// The client asked to disconnect.
    Quit,
}

/// Parses and executes one command line against the tree. Never panics on
/// malformed input — every parse problem becomes an `Error: ...` reply.
pub fn execute(tree: &LsmTree, line: &str) -> Outcome {
    let line = line.trim();
    if line.is_empty() {
        return Outcome::Reply("Error: Empty command".to_string());
    }

    match line.chars().next().unwrap() {
        'p' => Outcome::Reply(handle_put(tree, line)),
        'g' => Outcome::Reply(handle_get(tree, line)),
        'r' => Outcome::Reply(handle_range(tree, line)),
        'd' => Outcome::Reply(handle_delete(tree, line)),
        'l' => Outcome::Reply(handle_load(tree, line)),
        's' => {
            if line.split_whitespace().count() > 1 {
                Outcome::Reply("Error: Stats command takes no arguments".to_string())
            } else {
                Outcome::Reply(handle_stats(tree))
            }
        }
        'h' => Outcome::Reply(HELP_TEXT.to_string()),
        'q' => Outcome::Quit,
        _ => Outcome::Reply("Error: Unknown command".to_string()),
    }
}

fn parse_args<const N: usize>(line: &str) -> Result<[i64; N], String> {
    let tokens: Vec<&str> = line.split_whitespace().skip(1).collect();
    if tokens.len() != N {
        return Err(format!(
            "Error: Command requires exactly {} argument{}",
            N,
            if N == 1 { "" } else { "s" }
        ));
    }
    let mut args = [0i64; N];
    for (slot, token) in args.iter_mut().zip(&tokens) {
        *slot = token
            .parse()
            .map_err(|_| format!("Error parsing arguments: '{}' is not an integer", token))?;
    }
    Ok(args)
}

fn handle_put(tree: &LsmTree, line: &str) -> String {
    match parse_args::<2>(line) {
        Ok([key, value]) => match tree.put(key, value) {
            Ok(()) => format!("Put successful: {} -> {}", key, value),
            Err(e) => format!("Error: {:#}", e),
        },
        Err(e) => e,
    }
}

fn handle_get(tree: &LsmTree, line: &str) -> String {
    match parse_args::<1>(line) {
        Ok([key]) => match tree.get(key) {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => String::new(), // empty reply means "not found"
            Err(e) => format!("Error: {:#}", e),
        },
        Err(e) => e,
    }
}

fn handle_range(tree: &LsmTree, line: &str) -> String {
    match parse_args::<2>(line) {
        Ok([start, end]) => {
            if start >= end {
                return "Error: Start key must be less than end key".to_string();
            }
            match tree.range(start, end) {
                Ok(results) => {
                    let mut out = String::new();
                    for pair in &results {
                        let _ = write!(out, "{}:{} ", pair.key, pair.value);
                    }
                    out
                }
                Err(e) => format!("Error: {:#}", e),
            }
        }
        Err(e) => e,
    }
}

fn handle_delete(tree: &LsmTree, line: &str) -> String {
    match parse_args::<1>(line) {
        Ok([key]) => match tree.remove(key) {
            Ok(_) => "Delete successful".to_string(),
            Err(e) => format!("Error: {:#}", e),
        },
        Err(e) => e,
    }
}

fn handle_load(tree: &LsmTree, line: &str) -> String {
    // The path is quoted so it may contain spaces: l "some dir/pairs.bin"
    let Some(start) = line.find(&['"', '\''][..]) else {
        return "Error: Load command requires filepath in quotes".to_string();
    };
    let quote = line.as_bytes()[start] as char;
    let Some(end_rel) = line[start + 1..].find(quote) else {
        return "Error: Unclosed quote in filepath".to_string();
    };
    let path = &line[start + 1..start + 1 + end_rel];

    let trailing = &line[start + 1 + end_rel + 1..];
    if !trailing.trim().is_empty() {
        return "Error: Unexpected content after filepath".to_string();
    }

    match tree.load_file(path) {
        Ok(()) => format!("File loaded successfully: {}", path),
        Err(e) => format!("Error loading file: {:#}", e),
    }
}

fn handle_stats(tree: &LsmTree) -> String {
    let mut buf = Vec::new();
    if let Err(e) = tree.stats(&mut buf) {
        return format!("Error: {:#}", e);
    }
    let stats = String::from_utf8_lossy(&buf).into_owned();

    if stats.trim().is_empty() {
        return "The tree is empty. No data has been loaded.".to_string();
    }
    if stats.len() > MAX_STATS_BYTES {
        let mut truncated = stats[..MAX_STATS_BYTES].to_string();
        truncated.push_str("\n\n[WARNING: Stats output was truncated due to size]");
        return truncated;
    }
    stats
}
