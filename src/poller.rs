use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::ingest::{MailIngestionService, RunOutcome, TriggerSource};

#[derive(Debug, Error)]
#[error("mail poller is not running")]
pub struct PollerStopped;

/// Sends manual triggers to the poll loop.
#[derive(Clone)]
pub struct PollerHandle {
    triggers: mpsc::Sender<oneshot::Sender<RunOutcome>>,
}

impl PollerHandle {
    /// Fires a manual check and waits for its outcome, which is
    /// [`RunOutcome::AlreadyRunning`] when a run is in flight.
    pub async fn trigger(&self) -> Result<RunOutcome, PollerStopped> {
        let (reply, outcome) = oneshot::channel();
        self.triggers.send(reply).await.map_err(|_| PollerStopped)?;
        outcome.await.map_err(|_| PollerStopped)
    }
}

/// Starts the loop that checks mail every `period` (first check one period
/// from now) and on every manual trigger, until `shutdown` flips or is dropped.
/// A run already underway at shutdown is left to finish on its own.
pub fn spawn_poller(
    service: MailIngestionService,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (PollerHandle, JoinHandle<()>) {
    let (triggers, mut requests) = mpsc::channel::<oneshot::Sender<RunOutcome>>(8);

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("mail poller started, checking every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        service.check_mail(TriggerSource::Timer).await;
                    });
                }
                Some(reply) = requests.recv() => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        let outcome = service.check_mail(TriggerSource::Manual).await;
                        let _ = reply.send(outcome);
                    });
                }
                _ = shutdown.changed() => break,
            }
        }
        log::info!("mail poller stopped");
    });

    (PollerHandle { triggers }, task)
}
