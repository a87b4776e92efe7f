// src/commands.rs
//! Command handlers for the archiver CLI

use crate::cli::Cli;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use obarchive::{DescriptorRegistry, Orchestrator, RunSummary, discover};
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Exit status after an interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// How the blocking worker ended, as seen from the interrupt handler
#[derive(Debug)]
pub enum Supervised<T> {
    /// Finished without an interrupt
    Finished(T),
    /// Interrupted once; the worker stopped its jobs and returned
    Interrupted(T),
    /// Interrupted twice; the worker was left running
    Abandoned,
}

/// Wait for `worker`, raising `token` on the first interrupt and giving up
/// on the worker at the second
pub async fn supervise<T, I, F>(
    mut worker: JoinHandle<T>,
    token: &AtomicBool,
    mut interrupt: I,
) -> Result<Supervised<T>>
where
    I: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        result = &mut worker => {
            return Ok(Supervised::Finished(result.context("Archiver worker panicked")?));
        }
        signal = interrupt() => {
            signal.context("Failed to listen for interrupt")?;
        }
    }

    warn!("interrupted, waiting for running jobs to stop (interrupt again to exit now)");
    token.store(true, Ordering::Relaxed);

    tokio::select! {
        result = &mut worker => {
            Ok(Supervised::Interrupted(result.context("Archiver worker panicked")?))
        }
        signal = interrupt() => {
            signal.context("Failed to listen for interrupt")?;
            warn!("interrupted again, exiting without waiting for running jobs");
            Ok(Supervised::Abandoned)
        }
    }
}

/// Discover shards under the CLI roots and archive them
///
/// The blocking pool runs on a dedicated thread while this task waits for
/// either its completion or Ctrl-C. A first interrupt only raises the
/// cancellation flag; running jobs stop on their own and clean up their
/// partial archives before the summary is printed. A second interrupt
/// exits immediately.
pub async fn cmd_archive(cli: Cli) -> Result<ExitCode> {
    let token = Arc::new(AtomicBool::new(false));
    let options = cli
        .to_options()
        .context("Invalid compression settings")?
        .with_cancel_token(token.clone());
    let reporter = cli.reporter();

    match options.cutoff(SystemTime::now()) {
        Some(cutoff) => info!(
            "archiving shards last modified before {}",
            DateTime::<Local>::from(cutoff).format("%Y-%m-%d %H:%M:%S")
        ),
        None => info!("archiving shards regardless of age"),
    }

    let registry = DescriptorRegistry::with_builtins().context("Failed to register builtin sources")?;
    let roots = cli.roots;

    let worker = tokio::task::spawn_blocking(move || -> obarchive::Result<RunSummary> {
        let jobs = discover(&registry, &roots)?;
        Orchestrator::new(options).with_reporter(reporter).run(&jobs)
    });

    let (result, interrupted) = match supervise(worker, &token, tokio::signal::ctrl_c).await? {
        Supervised::Finished(result) => (result, false),
        Supervised::Interrupted(result) => (result, true),
        Supervised::Abandoned => return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE)),
    };

    let summary = result.context("Archiving run failed")?;
    if interrupted || summary.cancelled {
        return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::mpsc;
    use std::time::Duration;

    type Interrupt = Pin<Box<dyn Future<Output = io::Result<()>>>>;

    /// Interrupt source that fires `count` times, then never again
    fn interrupts(count: usize) -> impl FnMut() -> Interrupt {
        let mut fired = 0;
        move || -> Interrupt {
            fired += 1;
            if fired <= count {
                Box::pin(async { Ok(()) })
            } else {
                Box::pin(std::future::pending())
            }
        }
    }

    #[tokio::test]
    async fn test_worker_finishes_without_interrupt() {
        let token = AtomicBool::new(false);
        let worker = tokio::task::spawn_blocking(|| 7);

        let outcome = supervise(worker, &token, interrupts(0)).await.unwrap();
        assert!(matches!(outcome, Supervised::Finished(7)));
        assert!(!token.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_first_interrupt_waits_for_worker() {
        let token = Arc::new(AtomicBool::new(false));
        let flag = token.clone();
        let worker = tokio::task::spawn_blocking(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
            7
        });

        let outcome = supervise(worker, &token, interrupts(1)).await.unwrap();
        assert!(matches!(outcome, Supervised::Interrupted(7)));
        assert!(token.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_second_interrupt_abandons_worker() {
        let token = AtomicBool::new(false);
        let (release, wait) = mpsc::channel::<()>();
        let worker = tokio::task::spawn_blocking(move || {
            let _ = wait.recv();
            7
        });

        let outcome = supervise(worker, &token, interrupts(2)).await.unwrap();
        assert!(matches!(outcome, Supervised::Abandoned));
        assert!(token.load(Ordering::Relaxed));
        drop(release);
    }
}
