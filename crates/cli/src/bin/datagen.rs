//! Test-data generator: writes binary `(i64 key, i64 value)` pair files in
//! the layout the load commands and bulk loader consume.
//!
//! ```text
//! datagen <path> <count> [--seed N] [--sequential]
//! ```
//!
//! Random mode (the default) draws keys uniformly from the full `i64` range
//! minus the tombstone sentinel; `--sequential` writes `(i, i)` pairs, which
//! is the shape the bulk loader likes best. A fixed `--seed` makes the
//! output reproducible.

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use memtable::TOMBSTONE;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: datagen <path> <count> [--seed N] [--sequential]");
    }

    let path = &args[0];
    let count: u64 = args[1]
        .parse()
        .with_context(|| format!("invalid count '{}'", args[1]))?;

    let mut seed: Option<u64> = None;
    let mut sequential = false;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                i += 1;
                let value = args
                    .get(i)
                    .context("--seed requires a value")?;
                seed = Some(value.parse().with_context(|| format!("invalid seed '{}'", value))?);
            }
            "--sequential" => sequential = true,
            other => bail!("unknown option '{}'", other),
        }
        i += 1;
    }

    let file = File::create(path).with_context(|| format!("failed to create {}", path))?;
    let mut w = BufWriter::new(file);

    let mut rng = match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => SmallRng::from_entropy(),
    };

    for i in 0..count {
        let (key, value) = if sequential {
            (i as i64, i as i64)
        } else {
            let mut key: i64 = rng.gen();
            // The sentinel is reserved for deletes; never generate it.
            while key == TOMBSTONE {
                key = rng.gen();
            }
            let mut value: i64 = rng.gen();
            while value == TOMBSTONE {
                value = rng.gen();
            }
            (key, value)
        };
        w.write_i64::<LittleEndian>(key)?;
        w.write_i64::<LittleEndian>(value)?;
    }
    w.flush()?;

    println!("wrote {} pairs ({} bytes) to {}", count, count * 16, path);
    Ok(())
}
