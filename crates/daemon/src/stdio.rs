//! Stdio plugins
//!
//! The smallest useful pipeline: an input that turns stdin lines into packs
//! and an output that prints pack payloads to stdout. Useful for smoke
//! testing a config and as a template for real plugins.

use std::sync::Arc;

use ferry_engine::{Message, PackPool, PackRef, RouterHandle, RunnerState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Ident stamped on every pack produced from stdin
pub const STDIN_IDENT: &str = "stdin";

/// Read stdin line by line, each line becomes one pack
///
/// Blocks on `pool.acquire` when every pack is in flight - stdin simply
/// stops being consumed until the pipeline catches up. Exits on EOF.
pub async fn run_stdin_input(pool: PackPool, handle: RouterHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut produced: u64 = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                let pack = pool.acquire().await;
                {
                    let mut data = pack.data_mut();
                    data.message = Message::new(line);
                    data.ident = STDIN_IDENT.to_string();
                }
                pack.mark_input();
                handle.enqueue(pack).await;
                produced += 1;
            }
            Ok(None) => {
                tracing::info!(produced, "stdin closed, input exiting");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed, input exiting");
                break;
            }
        }
    }
}

/// Drain the matcher channel, printing each payload to stdout
///
/// Recycles every pack it receives and marks its runner stopped once the
/// channel closes (the removal protocol, or router teardown).
pub async fn run_stdout_output(mut rx: mpsc::Receiver<PackRef>, runner: Arc<RunnerState>) {
    let mut printed: u64 = 0;

    while let Some(pack) = rx.recv().await {
        {
            let data = pack.data();
            println!("{}", String::from_utf8_lossy(data.message.payload()));
        }
        pack.recycle();
        printed += 1;
    }

    runner.mark_stopped();
    tracing::info!(printed, "stdout output stopped");
}
