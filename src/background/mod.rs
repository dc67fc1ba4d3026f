//! Background work: periodic requests, periodic cache invalidation, and
//! cooperative shutdown.
//!
//! ## Core types
//!
//! - [`Scheduler`] — one control loop that multiplexes two intervals and a
//!   shutdown future with `tokio::select!`, handling one event at a time.
//! - [`SchedulerConfig`] — periods and request timeout, loadable from JSON.
//! - [`shutdown_signal`] — the process-level terminate notification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::client::Client;
use crate::http::{Request, StatusCode};
use crate::transport::{CachingTransport, Transport, TransportError};

pub mod config;
pub mod signal;

pub use config::{ConfigError, SchedulerConfig};
pub use signal::shutdown_signal;

/// Lifecycle of a [`Scheduler`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// What a scheduler did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests issued, successful or not.
    pub requests: u64,
    /// Requests that failed in transport, capture or body read.
    pub failures: u64,
    /// Cache clears performed.
    pub clears: u64,
}

/// Drives one request through a [`CachingTransport`] on a fixed period and
/// clears its cache on a longer one, until told to stop.
///
/// Both periods start counting when [`run`](Self::run) is called; the first
/// request goes out one request period later. If a handler overruns, later
/// ticks are delayed rather than fired in a burst.
///
/// Shutdown is checked between events only: a request already in flight
/// finishes, but nothing new is scheduled afterwards.
pub struct Scheduler {
    transport: Arc<CachingTransport>,
    client: Client,
    request: Request,
    config: SchedulerConfig,
    state: SchedulerState,
    summary: RunSummary,
}

impl Scheduler {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`SchedulerConfig::validate`].
    pub fn new(
        transport: Arc<CachingTransport>,
        request: Request,
        config: SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::new(Arc::clone(&transport) as Arc<dyn Transport>)
            .timeout(config.request_timeout());

        Ok(Self {
            transport,
            client,
            request,
            config,
            state: SchedulerState::Running,
            summary: RunSummary::default(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Runs the control loop until `shutdown` resolves.
    ///
    /// Returns immediately with the previous summary if the scheduler has
    /// already stopped.
    pub async fn run<F>(&mut self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        if self.state == SchedulerState::Stopped {
            return self.summary;
        }
        tokio::pin!(shutdown);

        let mut request_ticker = ticker(self.config.request_interval());
        let mut clear_ticker = ticker(self.config.clear_interval());

        info!(
            url = %self.request.url(),
            request_interval = ?self.config.request_interval(),
            clear_interval = ?self.config.clear_interval(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break,
                _ = clear_ticker.tick() => self.clear_cache(),
                _ = request_ticker.tick() => self.issue_request().await,
            }
        }

        // Tickers are dropped here: no further firings.
        self.state = SchedulerState::Stopped;
        info!(
            requests = self.summary.requests,
            failures = self.summary.failures,
            clears = self.summary.clears,
            "scheduler stopped"
        );
        self.summary
    }

    fn clear_cache(&mut self) {
        let dropped = self.transport.store().len();
        self.transport.clear();
        self.summary.clears += 1;
        debug!(dropped, "cache clear tick");
    }

    async fn issue_request(&mut self) {
        self.summary.requests += 1;
        match self.fetch().await {
            Ok((status, body)) => {
                info!(
                    status = status.as_u16(),
                    body = %String::from_utf8_lossy(&body),
                    "response body"
                );
            }
            Err(e) => {
                self.summary.failures += 1;
                error!(url = %self.request.url(), error = %e, "request failed, continuing");
            }
        }
    }

    async fn fetch(&self) -> crate::Result<(StatusCode, Bytes)> {
        let response = self.client.send(&self.request).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(TransportError::Io)?;
        Ok((status, body))
    }
}

/// An interval whose first tick is one full `period` away.
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
