use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;

/// Sleep source for the poller, injectable so tests can simulate time.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, PartialEq)]
pub enum PollOutcome<S> {
    /// The predicate held for this state.
    Done(S),
    /// The attempt bound was reached before the predicate held.
    TimedOut,
    /// The cancellation signal fired.
    Cancelled,
}

/// Poll an external state until a predicate holds, an attempt bound is hit,
/// or the run is cancelled. One probe per interval; the state fetch itself is
/// supplied by the caller, so a single poller serves certificate issuance and
/// pipeline completion alike.
pub struct Poller<C = TokioClock> {
    interval: Duration,
    max_attempts: Option<u32>,
    clock: C,
    cancel: Option<watch::Receiver<bool>>,
}

impl Poller<TokioClock> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            clock: TokioClock,
            cancel: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
            clock: TokioClock,
            cancel: None,
        }
    }
}

impl<C: Clock> Poller<C> {
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_clock<D: Clock>(self, clock: D) -> Poller<D> {
        Poller {
            interval: self.interval,
            max_attempts: self.max_attempts,
            clock,
            cancel: self.cancel,
        }
    }

    pub async fn run<S, E, F, Fut, D, T>(
        &mut self,
        mut fetch: F,
        is_done: D,
        mut on_tick: T,
    ) -> Result<PollOutcome<S>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        D: Fn(&S) -> bool,
        T: FnMut(u32, &S),
    {
        let mut attempt: u32 = 0;
        loop {
            if self.cancelled() {
                return Ok(PollOutcome::Cancelled);
            }

            let state = fetch().await?;
            if is_done(&state) {
                return Ok(PollOutcome::Done(state));
            }

            attempt += 1;
            on_tick(attempt, &state);

            if let Some(max) = self.max_attempts {
                if attempt >= max {
                    debug!("gave up polling after {attempt} attempts");
                    return Ok(PollOutcome::TimedOut);
                }
            }

            if self.sleep_or_cancel().await {
                return Ok(PollOutcome::Cancelled);
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Sleep one interval; returns true when cancellation fired first.
    async fn sleep_or_cancel(&mut self) -> bool {
        let interval = self.interval;
        match &mut self.cancel {
            Some(rx) => {
                let clock = &self.clock;
                tokio::select! {
                    _ = clock.sleep(interval) => false,
                    _ = wait_cancelled(rx) => true,
                }
            }
            None => {
                self.clock.sleep(interval).await;
                false
            }
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    match rx.wait_for(|cancelled| *cancelled).await {
        Ok(_) => {}
        // Sender gone without cancelling: never resolve, let the sleep win.
        Err(_) => std::future::pending().await,
    }
}
