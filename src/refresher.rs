//! A background thread that periodically pulls configuration rows, builds a new snapshot, and
//! installs it into an [`Evaluator`].
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    evaluator::Evaluator, snapshot::ConfigSnapshot, source::ConfigurationSource, Error, Result,
};

/// Configuration for [`Refresher`].
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Interval to wait between refreshes. [`Duration::ZERO`] disables background refresh.
    ///
    /// Defaults to [`RefresherConfig::DEFAULT_INTERVAL`].
    pub interval: Duration,
    /// Randomized duration subtracted from `interval` on every tick. This helps to avoid multiple
    /// instances pulling the source in lockstep.
    ///
    /// Defaults to [`RefresherConfig::DEFAULT_JITTER`].
    pub jitter: Duration,
}

impl RefresherConfig {
    /// Default value for [`RefresherConfig::interval`].
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    /// Default value for [`RefresherConfig::jitter`].
    pub const DEFAULT_JITTER: Duration = Duration::ZERO;

    /// Create a new `RefresherConfig` using default configuration.
    pub fn new() -> RefresherConfig {
        RefresherConfig::default()
    }

    /// Update refresh interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> RefresherConfig {
        self.interval = interval;
        self
    }

    /// Update refresh interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> RefresherConfig {
        self.jitter = jitter;
        self
    }

    /// Returns `true` if a background refresher should run.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

impl Default for RefresherConfig {
    fn default() -> RefresherConfig {
        RefresherConfig {
            interval: RefresherConfig::DEFAULT_INTERVAL,
            jitter: RefresherConfig::DEFAULT_JITTER,
        }
    }
}

/// The single writer of an [`Evaluator`]'s snapshot.
///
/// Background ticks and manual refreshes go through the same `Reloader`, which holds its lock from
/// fetch through swap. Snapshots are therefore installed in the order they were pulled, and an
/// older pull can never overwrite a newer one.
pub(crate) struct Reloader {
    source: Arc<dyn ConfigurationSource + Send + Sync>,
    evaluator: Evaluator,
    lock: Mutex<()>,
}

impl Reloader {
    pub(crate) fn new(
        source: Arc<dyn ConfigurationSource + Send + Sync>,
        evaluator: Evaluator,
    ) -> Reloader {
        Reloader {
            source,
            evaluator,
            lock: Mutex::new(()),
        }
    }

    /// Pull rows from the source, build a snapshot, and swap it into the evaluator.
    ///
    /// On error the active snapshot is left untouched.
    pub(crate) fn reload(&self) -> Result<Arc<ConfigSnapshot>> {
        // The mutex guards no data, so a source that panicked mid-reload leaves nothing to repair.
        let _writer = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let rows = self.source.fetch_rows()?;
        // Readers are not blocked while building; the swap only replaces a pointer.
        let snapshot = Arc::new(ConfigSnapshot::build(&rows)?);
        self.evaluator.swap(snapshot.clone());

        log::debug!(target: "featuresheet",
                    features = snapshot.feature_count(),
                    layers = snapshot.layer_count();
                    "installed new configuration snapshot");

        Ok(snapshot)
    }
}

/// A configuration refresher thread.
///
/// Every tick pulls the configuration source, builds a new snapshot, and swaps it into the
/// evaluator. A failed tick is logged and the evaluator keeps serving its last good snapshot.
///
/// Dropping a `Refresher` signals it to stop without waiting; use [`Refresher::shutdown`] to also
/// wait for the thread to exit.
pub struct Refresher {
    join_handle: Option<std::thread::JoinHandle<()>>,

    /// Used to send a stop command to the refresher thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

impl Refresher {
    /// Starts the refresher thread.
    ///
    /// The first tick happens after one interval: the caller is expected to have installed an
    /// initial snapshot already.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start(
        source: Arc<dyn ConfigurationSource + Send + Sync>,
        evaluator: Evaluator,
        config: RefresherConfig,
    ) -> Result<Refresher> {
        Refresher::with_reloader(Arc::new(Reloader::new(source, evaluator)), config)
    }

    /// Starts the refresher thread, sharing `reloader` with other writers.
    pub(crate) fn with_reloader(
        reloader: Arc<Reloader>,
        config: RefresherConfig,
    ) -> Result<Refresher> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough: `stop()` uses `try_send()` and a full buffer means
        // a stop command is already pending.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("featuresheet-refresher".to_owned())
            .spawn(move || loop {
                let timeout = jitter(config.interval, config.jitter);
                match stop_receiver.recv_timeout(timeout) {
                    Err(RecvTimeoutError::Timeout) => {
                        // Timed out. Refresh below.
                    }
                    Ok(()) => {
                        log::debug!(target: "featuresheet", "refresher thread received stop command");
                        return;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        // The `Refresher` is gone and nobody can stop us anymore.
                        log::debug!(target: "featuresheet", "refresher thread received disconnected");
                        return;
                    }
                }

                log::debug!(target: "featuresheet", "refreshing configuration");
                if let Err(err) = reloader.reload() {
                    log::warn!(target: "featuresheet",
                               build_error = err.is_build_error(),
                               source_unavailable = err.is_source_unavailable();
                               "failed to refresh configuration, keeping the previous snapshot: {}", err);
                }
            })?;

        Ok(Refresher {
            join_handle: Some(join_handle),
            stop_sender,
        })
    }

    /// Stop the refresher thread.
    ///
    /// This function does not wait for the thread to actually stop. A tick that is in progress
    /// completes first. Calling it more than once is harmless.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. The first case can be ignored as the thread is already stopped. The second case
        // means another stop command is already pending.
        let _ = self.stop_sender.try_send(());
    }

    /// Returns `true` once the refresher thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop the refresher thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`Refresher::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::RefresherPanicked`] if the thread has panicked.
    pub fn shutdown(mut self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .join()
                .map_err(|_| Error::RefresherPanicked)?;
        }

        Ok(())
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}

#[cfg(test)]
mod jitter_tests {
    use std::time::Duration;

    use super::{jitter, RefresherConfig};

    #[test]
    fn default_config_ticks_at_the_default_interval() {
        let config = RefresherConfig::default();
        assert_eq!(config.jitter, RefresherConfig::DEFAULT_JITTER);
        assert_eq!(
            jitter(config.interval, config.jitter),
            RefresherConfig::DEFAULT_INTERVAL
        );
    }

    #[test]
    fn jitter_never_delays_a_tick() {
        let config = RefresherConfig::new().with_jitter(RefresherConfig::DEFAULT_INTERVAL / 2);
        for _ in 0..100 {
            let delay = jitter(config.interval, config.jitter);
            assert!(delay <= config.interval, "{delay:?} must be <= {:?}", config.interval);
            assert!(delay >= config.interval - config.jitter);
        }
    }

    #[test]
    fn jitter_larger_than_the_interval_saturates() {
        let config = RefresherConfig::new()
            .with_interval(Duration::from_millis(5))
            .with_jitter(RefresherConfig::DEFAULT_INTERVAL);
        assert!(jitter(config.interval, config.jitter) <= Duration::from_millis(5));
        assert_eq!(jitter(Duration::ZERO, config.jitter), Duration::ZERO);
    }
}
