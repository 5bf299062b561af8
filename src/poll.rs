//! Periodic weight reads.
//!
//! [`PollingScheduler`] runs one read at a time against a shared
//! [`ScaleEngine`], sleeps for the configured interval, and repeats. The
//! interval is taken from a fresh config snapshot on every tick, so settings
//! changes apply from the next read without restarting the loop.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{
    config::ScaleConfig,
    decode::ReadOutcome,
    diagnostics::DiagnosticState,
    engine::ScaleEngine,
    error::Error,
    transport::Transport,
};

/// What one tick of the polling loop produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Reading(ReadOutcome),
    Failed {
        error: Error,
        /// Counters right after this failure was recorded.
        diagnostics: DiagnosticState,
    },
    /// Another operation held the link, so this tick sent nothing.
    Skipped,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives [`ScaleEngine::read_weight`] on a timer.
pub struct PollingScheduler<T: Transport + 'static> {
    engine: Arc<ScaleEngine<T>>,
    config: watch::Receiver<ScaleConfig>,
    events: mpsc::Sender<PollEvent>,
    running: Option<Running>,
}

impl<T: Transport + 'static> PollingScheduler<T> {
    pub fn new(
        engine: Arc<ScaleEngine<T>>,
        config: watch::Receiver<ScaleConfig>,
        events: mpsc::Sender<PollEvent>,
    ) -> Self {
        Self {
            engine,
            config,
            events,
            running: None,
        }
    }

    /// True while a loop is scheduled to run further ticks.
    pub fn is_polling(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.shutdown.is_cancelled() && !r.handle.is_finished())
    }

    /// Start polling, with the first read right away. Does nothing if
    /// already polling.
    pub fn start(&mut self) {
        if self.is_polling() {
            trace!("Polling already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.engine.clone(),
            self.config.clone(),
            self.events.clone(),
            shutdown.clone(),
        ));
        info!("Polling started");
        self.running = Some(Running { shutdown, handle });
    }

    /// Stop scheduling reads.
    ///
    /// A read already waiting for its reply still finishes and reports its
    /// event; the loop exits after that.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
            info!("Polling stopped");
        }
    }
}

impl<T: Transport + 'static> Drop for PollingScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<T: Transport + 'static>(
    engine: Arc<ScaleEngine<T>>,
    config: watch::Receiver<ScaleConfig>,
    events: mpsc::Sender<PollEvent>,
    shutdown: CancellationToken,
) {
    while !shutdown.is_cancelled() {
        let snapshot = config.borrow().clone();

        let event = match engine.read_weight(&snapshot).await {
            Ok(outcome) => {
                trace!(weight_kg = outcome.weight_kg, "Polled weight");
                PollEvent::Reading(outcome)
            }
            Err(Error::Busy) => {
                debug!("Link busy, skipping tick");
                PollEvent::Skipped
            }
            Err(error) => PollEvent::Failed {
                error,
                diagnostics: engine.diagnostics(),
            },
        };
        if events.send(event).await.is_err() {
            debug!("Event receiver closed, polling loop exiting");
            return;
        }

        let interval = Duration::from_millis(snapshot.poll_interval().to_millis().into());
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Polling loop exited");
}
