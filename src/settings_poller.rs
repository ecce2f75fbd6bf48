//! A background thread that periodically refreshes project settings and swaps them into the
//! settings store.

use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::cache::Cache;
use crate::registry::IntegrationRegistry;
use crate::settings::ProjectSettings;
use crate::settings_fetcher::SettingsFetcher;
use crate::settings_store::SettingsStore;
use crate::{Error, Result};

/// Configuration for [`SettingsPoller`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct SettingsPollerConfig {
    /// Interval to wait between settings refreshes.
    ///
    /// Defaults to [`SettingsPollerConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between refreshes. This helps to avoid
    /// multiple clients synchronizing and producing spiky network load.
    ///
    /// Defaults to [`SettingsPollerConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
}

impl SettingsPollerConfig {
    /// Default value for [`SettingsPollerConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
    /// Default value for [`SettingsPollerConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(60 * 60);

    /// Create a new `SettingsPollerConfig` using default configuration.
    pub fn new() -> SettingsPollerConfig {
        SettingsPollerConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> SettingsPollerConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> SettingsPollerConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for SettingsPollerConfig {
    fn default() -> SettingsPollerConfig {
        SettingsPollerConfig {
            interval: SettingsPollerConfig::DEFAULT_POLL_INTERVAL,
            jitter: SettingsPollerConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// A settings poller thread.
///
/// Periodically fetches settings with [`SettingsFetcher`]; on success writes them to the
/// settings cache, swaps them into the [`SettingsStore`], and hands the snapshot to the
/// [`IntegrationRegistry`] so integrations for newly appearing keys get constructed. On
/// retryable failure the current snapshot stays active and the next tick retries.
pub struct SettingsPoller {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` if settings haven't been fetched yet. Holds `Some(Ok(()))` after the first
    /// successful fetch. Holds `Some(Err(...))` if the first fetch failed fatally.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl SettingsPoller {
    /// Starts the settings poller thread.
    ///
    /// # Errors
    ///
    /// Returns an IO Error if the poller thread failed to start.
    pub fn start(
        fetcher: SettingsFetcher,
        store: Arc<SettingsStore>,
        cache: Arc<dyn Cache<ProjectSettings>>,
        registry: Arc<IntegrationRegistry>,
    ) -> std::io::Result<SettingsPoller> {
        SettingsPoller::start_with_config(
            fetcher,
            store,
            cache,
            registry,
            SettingsPollerConfig::default(),
        )
    }

    /// Starts the settings poller thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO Error if the poller thread failed to start.
    pub fn start_with_config(
        mut fetcher: SettingsFetcher,
        store: Arc<SettingsStore>,
        cache: Arc<dyn Cache<ProjectSettings>>,
        registry: Arc<IntegrationRegistry>,
        config: SettingsPollerConfig,
    ) -> std::io::Result<SettingsPoller> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 should be enough for our use case as we're sending a stop
        // command, and we can simply `try_send()` and ignore if the buffer is full (another
        // thread has sent a stop command already).
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value| {
                *result.0.lock().unwrap() = Some(value);
                result.1.notify_all();
            };

            std::thread::Builder::new()
                .name("beacon-settings".to_owned())
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        loop {
                            log::debug!(target: "beacon", "refreshing project settings");
                            match fetcher.fetch_settings() {
                                Ok(settings) => {
                                    cache.set(&settings);
                                    let settings = Arc::new(settings);
                                    store.set_settings(settings.clone());
                                    registry.accept_settings(&settings);
                                    update_result(Ok(()));
                                }
                                Err(err @ (Error::Unauthorized | Error::InvalidBaseUrl(_))) => {
                                    // Unrecoverable errors
                                    update_result(Err(err));
                                    return;
                                }
                                _ => {
                                    // Other errors are retryable; the current snapshot (cached
                                    // or defaults) stays active.
                                }
                            };

                            let timeout = jitter(config.interval, config.jitter);
                            match stop_receiver.recv_timeout(timeout) {
                                Err(RecvTimeoutError::Timeout) => {
                                    // Timed out. Loop back to refresh settings.
                                }
                                Ok(()) => {
                                    log::debug!(target: "beacon", "settings poller received stop command");
                                    return;
                                }
                                Err(RecvTimeoutError::Disconnected) => {
                                    // When the other end of channel disconnects, calls to
                                    // .recv_timeout() return immediately. Stop the thread.
                                    log::debug!(target: "beacon", "settings poller received disconnected");
                                    return;
                                }
                            }
                        }
                    }));

                    // If catch_unwind returns Err, it means a panic occurred.
                    if outcome.is_err() {
                        update_result(Err(Error::WorkerPanicked));
                    }
                })?
        };

        Ok(SettingsPoller {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Waits for the first settings refresh to resolve.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPanicked`]
    /// - [`Error::Unauthorized`]
    /// - [`Error::InvalidBaseUrl`]
    pub fn wait_for_settings(&self) -> Result<()> {
        let mut lock = self.result.0.lock().map_err(|_| Error::WorkerPanicked)?;
        loop {
            match &*lock {
                Some(result) => {
                    // The poller has already fetched the settings. Return Ok(()) or a possible
                    // error.
                    return result.clone();
                }
                None => {
                    // Block waiting for the first refresh.
                    lock = self.result.1.wait(lock).map_err(|_| Error::WorkerPanicked)?;
                }
            }
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. First case can be ignored as there's nothing useful we can do—thread is already
        // stopped. Second case can be ignored as it indicates that another thread already sent a
        // stop command and the thread will stop anyway.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`SettingsPoller::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in that
        // case.
        self.join_handle.join().map_err(|_| Error::WorkerPanicked)?;

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
