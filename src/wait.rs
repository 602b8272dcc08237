//! Polling a slow control plane until a resource converges or disappears.
//!
//! Both loops follow the same order on every attempt: probe, checkpoint the
//! observation, then decide whether to stop. A caller's durable state therefore
//! always holds the latest observation, even when the wait times out.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct WaitOptions {
    /// Budget for the whole wait, measured from the first probe.
    pub timeout: Duration,
    /// Pause between probes.
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl WaitOptions {
    pub fn new(timeout: Duration) -> Self {
        WaitOptions {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn cancel_on(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, PartialEq)]
pub enum WaitError<O, E> {
    /// The deadline passed; `last` is the final checkpointed observation.
    Timeout { attempts: u32, last: Option<O> },
    /// The probe or the checkpoint returned an error which stops the wait.
    Failed { attempts: u32, last: Option<O>, error: E },
    Cancelled { attempts: u32, last: Option<O> },
}

impl<O, E> WaitError<O, E> {
    /// Convert the carried observation, keeping everything else.
    pub fn map_last<P>(self, f: impl FnOnce(O) -> P) -> WaitError<P, E> {
        match self {
            WaitError::Timeout { attempts, last } => WaitError::Timeout {
                attempts,
                last: last.map(f),
            },
            WaitError::Failed { attempts, last, error } => WaitError::Failed {
                attempts,
                last: last.map(f),
                error,
            },
            WaitError::Cancelled { attempts, last } => WaitError::Cancelled {
                attempts,
                last: last.map(f),
            },
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WaitError::Timeout { attempts, .. }
            | WaitError::Failed { attempts, .. }
            | WaitError::Cancelled { attempts, .. } => *attempts,
        }
    }
}

enum Interrupt {
    Timeout,
    Cancelled,
}

/// Deadline, attempt count and cancellation shared by both loops.
struct Poller<'a> {
    options: &'a WaitOptions,
    deadline: Instant,
    attempts: u32,
}

impl<'a> Poller<'a> {
    fn start(options: &'a WaitOptions) -> Self {
        Poller {
            options,
            deadline: Instant::now() + options.timeout,
            attempts: 0,
        }
    }

    /// Run one probe, bounded by the deadline and the cancellation token.
    async fn probe<F: Future>(&mut self, probe: F) -> Result<F::Output, Interrupt> {
        self.attempts = self.attempts.saturating_add(1);
        debug!("Poll attempt {}", self.attempts);
        tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => Err(Interrupt::Cancelled),
            result = time::timeout_at(self.deadline, probe) => result.map_err(|_| Interrupt::Timeout),
        }
    }

    /// Sleep until the next attempt, never past the deadline.
    async fn pause(&self) -> Result<(), Interrupt> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(Interrupt::Timeout);
        }
        let wake = std::cmp::min(now + self.options.interval, self.deadline);
        tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = time::sleep_until(wake) => Ok(()),
        }
    }

    fn interrupted<O, E>(&self, interrupt: Interrupt, last: Option<O>) -> WaitError<O, E> {
        match interrupt {
            Interrupt::Timeout => WaitError::Timeout {
                attempts: self.attempts,
                last,
            },
            Interrupt::Cancelled => WaitError::Cancelled {
                attempts: self.attempts,
                last,
            },
        }
    }

    fn failed<O, E>(&self, error: E, last: Option<O>) -> WaitError<O, E> {
        WaitError::Failed {
            attempts: self.attempts,
            last,
            error,
        }
    }
}

/// Probe until `converged` holds for an observation.
///
/// Any probe error stops the wait. Returns the converged observation.
pub async fn until_converged<O, E, P, PF, V, C, CF>(
    options: &WaitOptions,
    mut probe: P,
    converged: V,
    mut checkpoint: C,
) -> Result<O, WaitError<O, E>>
where
    O: Clone,
    P: FnMut() -> PF,
    PF: Future<Output = Result<O, E>>,
    V: Fn(&O) -> bool,
    C: FnMut(O) -> CF,
    CF: Future<Output = Result<(), E>>,
{
    let mut poller = Poller::start(options);
    let mut last: Option<O> = None;

    loop {
        let observation = match poller.probe(probe()).await {
            Ok(Ok(observation)) => observation,
            Ok(Err(error)) => return Err(poller.failed(error, last)),
            Err(interrupt) => return Err(poller.interrupted(interrupt, last)),
        };
        if let Err(error) = checkpoint(observation.clone()).await {
            return Err(poller.failed(error, last));
        }
        if converged(&observation) {
            return Ok(observation);
        }
        last = Some(observation);

        if let Err(interrupt) = poller.pause().await {
            return Err(poller.interrupted(interrupt, last));
        }
    }
}

/// Probe until `absent` classifies a probe error as "the resource is gone".
///
/// Other probe errors stop the wait; successful probes mean the resource is
/// still present and are checkpointed before the next attempt.
pub async fn until_absent<O, E, P, PF, A, C, CF>(
    options: &WaitOptions,
    mut probe: P,
    absent: A,
    mut checkpoint: C,
) -> Result<(), WaitError<O, E>>
where
    O: Clone,
    P: FnMut() -> PF,
    PF: Future<Output = Result<O, E>>,
    A: Fn(&E) -> bool,
    C: FnMut(O) -> CF,
    CF: Future<Output = Result<(), E>>,
{
    let mut poller = Poller::start(options);
    let mut last: Option<O> = None;

    loop {
        let observation = match poller.probe(probe()).await {
            Ok(Ok(observation)) => observation,
            Ok(Err(error)) if absent(&error) => return Ok(()),
            Ok(Err(error)) => return Err(poller.failed(error, last)),
            Err(interrupt) => return Err(poller.interrupted(interrupt, last)),
        };
        if let Err(error) = checkpoint(observation.clone()).await {
            return Err(poller.failed(error, last));
        }
        last = Some(observation);

        if let Err(interrupt) = poller.pause().await {
            return Err(poller.interrupted(interrupt, last));
        }
    }
}
