//! Per-server sampling loop.
//!
//! Each poller owns one server's reachability and its own tick timer:
//!
//! ```text
//! Idle ──tick──▶ Sampling ──ok───▶ Published ──▶ Idle
//!                    └─────err/timeout──▶ FailedCycle ──▶ Idle
//! ```
//!
//! A cycle fetches the operation list and the status report together. A
//! failed listing publishes an empty batch and marks the server unreachable;
//! a failed status call only leaves the batch without details. The tick
//! interval never backs off, so a recovered server shows up again within one
//! tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::data::{Batch, Rates, RawStatus, Reachability, ServerDetails, StatusCounters};
use crate::error::ServerError;
use crate::server::ServerHandle;

/// Where a poller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Sampling,
    Published,
    FailedCycle,
}

/// Control messages from the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    /// Reset the tick timer and failure count, and sample right away.
    Restart,
    /// Reset the failure count and put the timer back on this poller's
    /// original phase, without an extra sample.
    Resync,
}

/// Timing for one poller.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Deadline for one fetch; kept strictly below `interval`.
    pub fetch_timeout: Duration,
    /// Delay before the first sample, used to stagger servers.
    pub first_tick: Duration,
}

impl PollerConfig {
    pub fn new(interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            interval,
            fetch_timeout: clamp_fetch_timeout(interval, fetch_timeout),
            first_tick: Duration::ZERO,
        }
    }

    pub fn with_first_tick(mut self, delay: Duration) -> Self {
        self.first_tick = delay;
        self
    }
}

/// Keep a fetch deadline strictly shorter than the poll interval.
pub fn clamp_fetch_timeout(interval: Duration, timeout: Duration) -> Duration {
    if timeout < interval {
        timeout
    } else {
        interval * 4 / 5
    }
}

/// Drives one [`ServerHandle`] on a fixed interval.
#[derive(Debug)]
pub struct Poller {
    handle: Arc<ServerHandle>,
    aggregator: Arc<Aggregator>,
    config: PollerConfig,
    state: PollerState,
    reachability: Reachability,
    sequence: u64,
    consecutive_failures: u32,
    last_counters: Option<(Instant, StatusCounters)>,
}

impl Poller {
    pub fn new(handle: Arc<ServerHandle>, aggregator: Arc<Aggregator>, config: PollerConfig) -> Self {
        Self {
            handle,
            aggregator,
            config,
            state: PollerState::Idle,
            reachability: Reachability::Pending,
            sequence: 0,
            consecutive_failures: 0,
            last_counters: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn reachability(&self) -> Reachability {
        self.reachability
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Sample until cancelled.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PollerCommand>, cancel: CancellationToken) {
        let origin = Instant::now() + self.config.first_tick;
        let mut ticker = time::interval_at(origin, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        tracing::debug!(server = %self.handle.label(), interval = ?self.config.interval, "poller started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv(), if commands_open => match command {
                    Some(PollerCommand::Restart) => {
                        tracing::info!(server = %self.handle.label(), "poller restarted");
                        self.consecutive_failures = 0;
                        ticker.reset();
                        if self.sample_or_cancel(&cancel).await.is_none() {
                            break;
                        }
                    }
                    Some(PollerCommand::Resync) => {
                        tracing::debug!(server = %self.handle.label(), "poller resynced");
                        self.consecutive_failures = 0;
                        ticker.reset_at(next_on_phase(origin, self.config.interval, Instant::now()));
                    }
                    None => commands_open = false,
                },
                _ = ticker.tick() => {
                    if self.sample_or_cancel(&cancel).await.is_none() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(server = %self.handle.label(), "poller stopped");
    }

    async fn sample_or_cancel(&mut self, cancel: &CancellationToken) -> Option<PollerState> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            state = self.poll_once() => Some(state),
        }
    }

    /// Run one sampling cycle and publish its batch.
    ///
    /// Returns the state the cycle ended in; the poller is `Idle` again
    /// afterwards.
    pub async fn poll_once(&mut self) -> PollerState {
        self.state = PollerState::Sampling;
        self.sequence += 1;
        let address = self.handle.address().to_string();

        let timeout = self.config.fetch_timeout;
        let (listing, status) = tokio::join!(
            self.handle.fetch_operations(self.sequence, timeout),
            self.handle.fetch_status(timeout),
        );

        let outcome = match listing {
            Ok(operations) => {
                if self.reachability == Reachability::Unreachable {
                    tracing::info!(
                        server = %self.handle.label(),
                        failures = self.consecutive_failures,
                        "server reachable again"
                    );
                }
                tracing::trace!(server = %self.handle.label(), count = operations.len(), "sampled");
                self.reachability = Reachability::Connected;
                self.consecutive_failures = 0;
                let details = self.details(status);
                self.aggregator
                    .publish(Batch::success(address, self.sequence, operations).with_details(details));
                PollerState::Published
            }
            Err(e) => {
                if self.consecutive_failures == 0 {
                    tracing::warn!(server = %self.handle.label(), error = %e, "poll failed");
                } else {
                    tracing::debug!(
                        server = %self.handle.label(),
                        error = %e,
                        failures = self.consecutive_failures + 1,
                        "poll failed again"
                    );
                }
                self.reachability = Reachability::Unreachable;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.aggregator.publish(Batch::failure(address, self.sequence, e.to_string()));
                PollerState::FailedCycle
            }
        };

        self.state = PollerState::Idle;
        outcome
    }

    fn details(&mut self, status: Result<RawStatus, ServerError>) -> Option<ServerDetails> {
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(server = %self.handle.label(), error = %e, "status unavailable");
                return None;
            }
        };

        let now = Instant::now();
        let rates = self.last_counters.and_then(|(at, previous)| {
            Rates::between(&previous, &status.counters, now.saturating_duration_since(at))
        });
        self.last_counters = Some((now, status.counters));
        Some(ServerDetails { status, rates })
    }
}

/// The first tick of the schedule `origin + k * interval` that is after `now`.
fn next_on_phase(origin: Instant, interval: Duration, now: Instant) -> Instant {
    if now < origin || interval.is_zero() {
        return origin.max(now);
    }
    let elapsed = now.duration_since(origin).as_nanos();
    let step = interval.as_nanos();
    let ticks = u32::try_from(elapsed / step + 1).unwrap_or(u32::MAX);
    origin + interval * ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OpId, ServerInfo};
    use crate::server::testing::{raw_op, ScriptedClient};

    fn setup(client: Arc<ScriptedClient>) -> (Poller, Arc<Aggregator>) {
        let info = ServerInfo::new("db2", "db2");
        let aggregator = Arc::new(Aggregator::new(vec![ServerInfo::new("db1", "db1"), info.clone()]));
        let handle = Arc::new(ServerHandle::new(info, client));
        let config = PollerConfig::new(Duration::from_secs(1), Duration::from_millis(800));
        (Poller::new(handle, aggregator.clone(), config), aggregator)
    }

    #[test]
    fn test_fetch_timeout_is_kept_below_interval() {
        let config = PollerConfig::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(config.fetch_timeout, Duration::from_millis(800));
        let config = PollerConfig::new(Duration::from_secs(2), Duration::from_millis(500));
        assert_eq!(config.fetch_timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_successful_cycle_publishes_and_marks_connected() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(7, 12)]));
        let (mut poller, aggregator) = setup(client);

        assert_eq!(poller.poll_once().await, PollerState::Published);
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(poller.reachability(), Reachability::Connected);

        let snapshot = aggregator.current_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries[0].operation.op_id, OpId::Num(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_recovery() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(7, 12)]));
        let (mut poller, aggregator) = setup(client.clone());
        aggregator.publish(Batch::success("db1", 1, vec![crate::data::snapshot::tests::op("db1", 1, 5)]));

        poller.poll_once().await;
        assert_eq!(aggregator.current_snapshot().len(), 2);

        // db2 hangs past its deadline
        client.set_delay(Some(Duration::from_secs(30)));
        assert_eq!(poller.poll_once().await, PollerState::FailedCycle);
        let snapshot = aggregator.current_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries[0].operation.server, "db1");
        let db2 = snapshot.server("db2").unwrap();
        assert_eq!(db2.reachability, Reachability::Unreachable);
        assert!(db2.last_error.as_deref().unwrap().contains("timed out"));

        // and answers again on the following tick
        client.set_delay(None);
        assert_eq!(poller.poll_once().await, PollerState::Published);
        let snapshot = aggregator.current_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.server("db2").unwrap().reachability, Reachability::Connected);
        assert_eq!(poller.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_polling() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 1)]));
        client.set_failing(Some(ServerError::Connection("refused".into())));
        let (mut poller, _aggregator) = setup(client.clone());

        for _ in 0..3 {
            assert_eq!(poller.poll_once().await, PollerState::FailedCycle);
        }
        assert_eq!(poller.consecutive_failures(), 3);

        client.set_failing(None);
        assert_eq!(poller.poll_once().await, PollerState::Published);
        assert_eq!(client.fetches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_until_cancelled() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 1)]));
        let (poller, _aggregator) = setup(client.clone());
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(rx, cancel.clone()));
        time::sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        task.await.unwrap();

        // ticks at 0s, 1s, 2s, 3s
        assert_eq!(client.fetches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_samples_immediately() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 1)]));
        let (poller, _aggregator) = setup(client.clone());
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(rx, cancel.clone()));
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.fetches(), 1);

        tx.send(PollerCommand::Restart).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.fetches(), 2);

        // The timer restarted from the restart instant, not the original phase.
        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(client.fetches(), 2);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.fetches(), 3);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_returns_to_original_phase_without_sampling() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 1)]));
        let (poller, _aggregator) = setup(client.clone());
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(rx, cancel.clone()));
        time::sleep(Duration::from_millis(500)).await;
        tx.send(PollerCommand::Restart).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.fetches(), 2);

        tx.send(PollerCommand::Resync).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.fetches(), 2);

        // back on the 0s, 1s, 2s schedule rather than 1.5s after the restart
        time::sleep(Duration::from_millis(490)).await;
        assert_eq!(client.fetches(), 3);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.fetches(), 3);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.fetches(), 4);

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_next_on_phase() {
        let origin = Instant::now();
        let second = Duration::from_secs(1);
        assert_eq!(next_on_phase(origin, second, origin + Duration::from_millis(600)), origin + second);
        assert_eq!(next_on_phase(origin, second, origin + second), origin + second * 2);
        assert_eq!(next_on_phase(origin + second, second, origin), origin + second);
    }

    fn status_with_operations(operations: u64) -> RawStatus {
        RawStatus {
            counters: StatusCounters {
                operations,
                ..StatusCounters::default()
            },
            connections: 12,
            ..RawStatus::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_rates_from_consecutive_samples() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let (mut poller, aggregator) = setup(client.clone());

        client.set_status(status_with_operations(1_000));
        poller.poll_once().await;
        let details = aggregator.current_snapshot().server("db2").unwrap().details.clone().unwrap();
        assert_eq!(details.status.connections, 12);
        assert!(details.rates.is_none());

        time::advance(Duration::from_secs(2)).await;
        client.set_status(status_with_operations(1_500));
        poller.poll_once().await;
        let details = aggregator.current_snapshot().server("db2").unwrap().details.clone().unwrap();
        assert_eq!(details.rates.unwrap().operations, 250.0);
    }

    #[tokio::test]
    async fn test_failed_status_keeps_server_connected() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(7, 12)]));
        client.set_status_error(Some(ServerError::Protocol("not authorized".into())));
        let (mut poller, aggregator) = setup(client);

        assert_eq!(poller.poll_once().await, PollerState::Published);
        let snapshot = aggregator.current_snapshot();
        let db2 = snapshot.server("db2").unwrap();
        assert_eq!(db2.reachability, Reachability::Connected);
        assert!(db2.details.is_none());
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_fetch() {
        let client = Arc::new(ScriptedClient::new(vec![raw_op(1, 1)]));
        client.set_delay(Some(Duration::from_secs(3_600)));
        let info = ServerInfo::new("db2", "db2");
        let aggregator = Arc::new(Aggregator::new(vec![info.clone()]));
        let handle = Arc::new(ServerHandle::new(info, client));
        // Long interval and deadline so only cancellation can end the fetch.
        let config = PollerConfig::new(Duration::from_secs(7_200), Duration::from_secs(7_000));
        let poller = Poller::new(handle, aggregator, config);
        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(poller.run(rx, cancel.clone()));
        time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
