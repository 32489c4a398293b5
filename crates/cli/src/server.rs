//! Line-oriented TCP front end.
//!
//! A fixed pool of worker threads services connections; each connection
//! reads commands line by line, executes them against the shared tree, and
//! writes one response per command terminated by `\r\n`. The engine's own
//! lock serializes the actual storage work, so the pool only bounds how many
//! clients can be mid-command at once.

use anyhow::{Context, Result};
use engine::LsmTree;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{self, Outcome};

/// Terminates every response so clients can frame replies that contain
/// newlines (stats, help).
const RESPONSE_DELIMITER: &str = "\r\n";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads fed from one channel.
pub struct ThreadPool {
    workers: Vec<JoinHandle<()>>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "thread pool needs at least one worker");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                std::thread::spawn(move || loop {
                    let job = receiver.lock().expect("pool receiver poisoned").recv();
                    match job {
                        Ok(job) => job(),
                        Err(_) => {
                            debug!("worker {} shutting down", id);
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            workers,
            sender: Some(sender),
        }
    }

    pub fn execute<F: FnOnce() + Send + 'static>(&self, job: F) {
        if let Some(sender) = &self.sender {
            // Send only fails if every worker is gone, which means we are
            // shutting down anyway.
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel makes every worker's recv() fail and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Accepts connections forever, dispatching each to the pool.
pub fn serve(tree: Arc<LsmTree>, addr: &str, threads: usize) -> Result<()> {
    let listener =
        TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {} with {} worker threads", addr, threads);

    let pool = ThreadPool::new(threads);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let tree = Arc::clone(&tree);
                pool.execute(move || {
                    if let Err(e) = handle_connection(&tree, stream) {
                        warn!("connection error: {:#}", e);
                    }
                });
            }
            Err(e) => warn!("accept failed: {}", e),
        }
    }
    Ok(())
}

fn handle_connection(tree: &LsmTree, stream: TcpStream) -> Result<()> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    debug!("client connected: {}", peer);

    let mut writer = stream.try_clone().context("failed to clone stream")?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line.context("read from client failed")?;
        match command::execute(tree, &line) {
            Outcome::Reply(reply) => {
                writer.write_all(reply.as_bytes())?;
                writer.write_all(RESPONSE_DELIMITER.as_bytes())?;
                writer.flush()?;
            }
            Outcome::Quit => break,
        }
    }

    debug!("client disconnected: {}", peer);
    Ok(())
}
