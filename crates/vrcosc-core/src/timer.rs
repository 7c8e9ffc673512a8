//! Periodic background work and cooperative cancellation.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Shared cancellation flag handed to long-running module hooks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a callback on its own thread: once immediately, then every interval.
///
/// Errors and panics from a tick are logged and the timer keeps going.
/// [`TimedTask::stop`] lets an in-flight tick finish before returning.
pub struct TimedTask {
    name: String,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl TimedTask {
    pub fn start<N, F>(name: N, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        N: Into<String>,
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let task_name = name.clone();

        let thread = thread::Builder::new()
            .name(format!("timer-{}", name))
            .spawn(move || loop {
                match panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::error!("[TIMER] {} tick failed: {:#}", task_name, e),
                    Err(_) => log::error!("[TIMER] {} tick panicked", task_name),
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        log::debug!("[TIMER] Started {} every {:?}", name, interval);
        Ok(Self {
            name,
            stop_tx,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the timer and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        let _ = self.stop_tx.try_send(());
        // Dropped from inside a tick; the loop exits on the stop signal.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("[TIMER] {} thread panicked", self.name);
        }
        log::debug!("[TIMER] Stopped {}", self.name);
    }
}

impl Drop for TimedTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedTask")
            .field("name", &self.name)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_first_tick_is_immediate() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = TimedTask::start("immediate", Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        task.stop();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_and_panicking_ticks_keep_timer_alive() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = TimedTask::start("flaky", Duration::from_millis(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => anyhow::bail!("first tick fails"),
                1 => panic!("second tick panics"),
                _ => Ok(()),
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(200));
        task.stop();
        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = TimedTask::start("stopped", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        task.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
