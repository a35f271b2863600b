//! Cooperative cancellation for recipes that would otherwise run forever.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

/// Longest stretch a cancellable sleep goes without checking the flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }
}

/// Arm a token that is cancelled when a line (or EOF) arrives on stdin.
///
/// Only arm this for work that ends by being stopped: the reader thread
/// consumes the next line typed, whoever it was meant for.
pub fn stop_on_enter() -> io::Result<CancelToken> {
    let token = CancelToken::new();
    let trigger = token.clone();

    println!("Press Enter to stop");
    thread::Builder::new()
        .name("stop-on-enter".to_owned())
        .spawn(move || {
            let mut line = String::new();
            if let Err(err) = io::stdin().lock().read_line(&mut line) {
                debug!("Stop reader failed: {err}");
            }
            info!("Stop requested");
            trigger.cancel();
        })?;

    Ok(token)
}
