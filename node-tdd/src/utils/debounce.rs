//! Trailing-edge debounce for watch triggers.
//!
//! A burst of file events should start exactly one test run, fired once the
//! project has been quiet for the debounce interval. Unlike a keyed debouncer
//! there is a single pending slot: every event replaces the pending value and
//! pushes the deadline back.
//!
//! # Architecture
//!
//! The debouncer owns a background task that:
//!
//! 1. Stores the latest value and resets the deadline on every event
//! 2. Sleeps until the deadline with `tokio::time::sleep_until`
//! 3. Emits the latest value on the output channel when the deadline passes
//!
//! Dropping the [`Debouncer`] closes its input channel; a pending value is
//! then discarded rather than flushed, so a deactivated watch never fires a
//! late run.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use node_tdd::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(8);
//!     let debouncer = Debouncer::new(Duration::from_millis(400), output_tx);
//!
//!     debouncer.send("src/a.ts").await.unwrap();
//!     debouncer.send("src/b.ts").await.unwrap();
//!
//!     // One trigger, carrying the last value
//!     assert_eq!(output_rx.recv().await, Some("src/b.ts"));
//! }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Capacity of the input channel; bursts beyond this are dropped by
/// [`Debouncer::try_send`], which is harmless since only the last value counts.
const INPUT_CAPACITY: usize = 256;

/// Error type for debouncer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The debouncer's input channel has been closed.
    ChannelClosed,
}

impl std::fmt::Display for DebouncerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "debouncer channel closed"),
        }
    }
}

impl std::error::Error for DebouncerError {}

/// A single-slot, trailing-edge debouncer.
///
/// The background task is aborted when the debouncer is dropped.
#[derive(Debug)]
pub struct Debouncer<V>
where
    V: Send + 'static,
{
    /// Channel for sending events to the background task.
    input_tx: mpsc::Sender<V>,
    /// Handle to the background task.
    task_handle: JoinHandle<()>,
}

impl<V> Debouncer<V>
where
    V: Send + 'static,
{
    /// Creates a new debouncer with the specified quiet period.
    ///
    /// A zero interval emits on the next scheduler turn, still collapsing
    /// events that were already queued.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<V>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        let task_handle = tokio::spawn(async move {
            run_debounce_loop(interval, input_rx, output_tx).await;
        });

        Self {
            input_tx,
            task_handle,
        }
    }

    /// Sends an event to be debounced.
    ///
    /// # Errors
    ///
    /// Returns `DebouncerError::ChannelClosed` if the background task has
    /// terminated.
    pub async fn send(&self, value: V) -> Result<(), DebouncerError> {
        self.input_tx
            .send(value)
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Attempts to send an event without waiting.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn try_send(&self, value: V) -> bool {
        self.input_tx.try_send(value).is_ok()
    }

    /// Returns a sender that feeds this debouncer, for use from other tasks.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<V> {
        self.input_tx.clone()
    }
}

impl<V> Drop for Debouncer<V>
where
    V: Send + 'static,
{
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

/// Runs the debounce loop until the input channel closes.
async fn run_debounce_loop<V>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<V>,
    output_tx: mpsc::Sender<V>,
) {
    let mut pending: Option<(V, Instant)> = None;

    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        let deadline = pending.as_ref().map(|(_, deadline)| *deadline);

        tokio::select! {
            event = input_rx.recv() => {
                match event {
                    Some(value) => {
                        trace!("Received event, resetting deadline");
                        pending = Some((value, Instant::now() + interval));
                    }
                    None => {
                        if pending.is_some() {
                            debug!("Input channel closed, discarding pending event");
                        }
                        break;
                    }
                }
            }

            () = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                if let Some((value, _)) = pending.take() {
                    trace!("Emitting debounced event");
                    if output_tx.send(value).await.is_err() {
                        warn!("Debounce output channel closed, stopping");
                        break;
                    }
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}
