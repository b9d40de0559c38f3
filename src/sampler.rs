//! The sampling loop: one round per tick, every host probed in order.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::config::AppConfig;
use crate::ping::Sample;
use crate::ping_executor::Probe;
use crate::sample_log::{LogError, SampleLog};
use crate::sample_store::{SampleStore, WindowSnapshot};

/// Owns the rolling windows and the log buffer; the only writer of both.
pub struct Monitor<P> {
    hosts: Vec<String>,
    interval: Duration,
    autosave_rounds: Option<u32>,
    probe: P,
    store: SampleStore,
    log: SampleLog,
    rounds: u64,
    publisher: watch::Sender<WindowSnapshot>,
}

impl<P: Probe> Monitor<P> {
    pub fn new(config: &AppConfig, probe: P, log: SampleLog) -> Self {
        let hosts = config.hosts.clone();
        let store = SampleStore::new(&hosts, config.max_points);
        let (publisher, _) = watch::channel(store.snapshot_all());

        Self {
            hosts,
            interval: config.interval(),
            autosave_rounds: config.autosave_rounds.filter(|n| *n > 0),
            probe,
            store,
            log,
            rounds: 0,
            publisher,
        }
    }

    /// A receiver that sees a complete snapshot of every window after each round.
    pub fn subscribe(&self) -> watch::Receiver<WindowSnapshot> {
        self.publisher.subscribe()
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Probes every host once. All samples of the round share the round-start timestamp.
    pub async fn tick(&mut self) {
        let timestamp = Sample::now_timestamp();

        for index in 0..self.hosts.len() {
            let latency = self.probe.probe(&self.hosts[index]).await;
            self.record(Sample::new(timestamp, self.hosts[index].clone(), latency));
        }

        self.rounds += 1;
        self.publisher.send_replace(self.store.snapshot_all());

        if let Some(every) = self.autosave_rounds {
            if self.rounds % u64::from(every) == 0 {
                if let Err(e) = self.log.flush() {
                    log::warn!("Checkpoint flush failed, will retry: {e}");
                }
            }
        }
    }

    fn record(&mut self, sample: Sample) {
        if sample.is_success() {
            log::info!("{}", sample.describe());
        } else {
            log::warn!("{}", sample.describe());
        }
        self.store.append(&sample.host, sample.latency);
        self.log.append(sample);
    }

    /// Runs rounds forever. A round that overruns the interval is followed
    /// immediately by the next one.
    pub async fn run(&mut self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Runs until `shutdown` completes, then flushes the log once. A shutdown
    /// that is already complete wins over starting another round.
    ///
    /// A round interrupted mid-probe keeps the samples it already recorded;
    /// the host being probed at that moment gets no sample.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), LogError>
    where
        F: Future<Output = ()>,
    {
        log::info!(
            "Pinging {} every {:?}, logging to {}",
            self.hosts.join(", "),
            self.interval,
            self.log.path().display()
        );

        tokio::select! {
            biased;
            _ = shutdown => {}
            _ = self.run() => {}
        }

        log::info!(
            "Stopping after {} rounds; writing {} new samples to {}",
            self.rounds,
            self.log.pending(),
            self.log.path().display()
        );
        self.log.flush()
    }
}
