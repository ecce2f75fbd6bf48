//! The public client: validates calls, builds payloads, routes them to integrations and the
//! dispatch queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::cache::{Cache, FileCache};
use crate::context::{AnalyticsContext, AppInfo, DeviceInfo};
use crate::dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
use crate::instances::InstanceRegistry;
use crate::integration::{Integration, IntegrationFactory};
use crate::lifecycle::{AppVersion, LifecycleEvent};
use crate::options::Options;
use crate::payload::{Body, Payload, PayloadType, Properties, TimestampPrecision};
use crate::queue::{PayloadQueue, DEFAULT_CAPACITY};
use crate::registry::IntegrationRegistry;
use crate::routing;
use crate::settings::{ProjectSettings, COLLECTOR_INTEGRATION_KEY};
use crate::settings_fetcher::{SettingsFetcher, SettingsFetcherConfig};
use crate::settings_poller::{SettingsPoller, SettingsPollerConfig};
use crate::settings_store::SettingsStore;
use crate::task_runner::{TaskRunner, ThreadRunner};
use crate::traits::Traits;
use crate::transform::{NoopTransform, Transform};
use crate::uploader::{BatchUploader, Uploader, DEFAULT_UPLOAD_URL};
use crate::{Error, Result};

/// Configuration for an [`Analytics`] instance.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use beacon::{AnalyticsConfig, Analytics, InstanceRegistry};
/// let instances = Arc::new(InstanceRegistry::new());
/// let analytics = Analytics::create(
///     AnalyticsConfig::from_write_key("write-key"),
///     &instances,
/// ).expect("client creation failed");
/// ```
pub struct AnalyticsConfig {
    write_key: String,
    tag: Option<String>,
    settings_url: String,
    upload_url: String,
    data_dir: PathBuf,
    flush_queue_size: usize,
    flush_interval: Duration,
    queue_capacity: usize,
    timestamp_precision: TimestampPrecision,
    default_settings: ProjectSettings,
    default_options: Options,
    track_lifecycle_events: bool,
    record_screen_views: bool,
    app: AppInfo,
    device: DeviceInfo,
    factories: Vec<Box<dyn IntegrationFactory>>,
    transform: Arc<dyn Transform>,
    refresh_settings: bool,
    poller_config: SettingsPollerConfig,
    // Injectable collaborators. `None` selects the production implementation.
    runner: Option<Arc<dyn TaskRunner>>,
    uploader: Option<Arc<dyn Uploader>>,
    traits_cache: Option<Arc<dyn Cache<Traits>>>,
    settings_cache: Option<Arc<dyn Cache<ProjectSettings>>>,
    opt_out_cache: Option<Arc<dyn Cache<bool>>>,
    app_version_cache: Option<Arc<dyn Cache<AppVersion>>>,
}

impl AnalyticsConfig {
    /// Create a default configuration using the specified write key.
    pub fn from_write_key(write_key: impl Into<String>) -> AnalyticsConfig {
        AnalyticsConfig {
            write_key: write_key.into(),
            tag: None,
            settings_url: crate::settings_fetcher::DEFAULT_BASE_URL.to_owned(),
            upload_url: DEFAULT_UPLOAD_URL.to_owned(),
            data_dir: std::env::temp_dir().join("beacon"),
            flush_queue_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_CAPACITY,
            timestamp_precision: TimestampPrecision::default(),
            default_settings: ProjectSettings::default(),
            default_options: Options::default(),
            track_lifecycle_events: false,
            record_screen_views: false,
            app: AppInfo::default(),
            device: DeviceInfo::default(),
            factories: Vec::new(),
            transform: Arc::new(NoopTransform),
            refresh_settings: true,
            poller_config: SettingsPollerConfig::default(),
            runner: None,
            uploader: None,
            traits_cache: None,
            settings_cache: None,
            opt_out_cache: None,
            app_version_cache: None,
        }
    }

    /// Tag distinguishing this instance in the instance registry and on disk. Defaults to the
    /// write key.
    pub fn tag(mut self, tag: impl Into<String>) -> AnalyticsConfig {
        self.tag = Some(tag.into());
        self
    }

    /// Directory for the payload journal and caches. Each instance stores its state under a
    /// per-tag subdirectory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> AnalyticsConfig {
        self.data_dir = dir.into();
        self
    }

    /// Override base URL for settings fetches. Clients should use the default in most cases.
    pub fn settings_url(mut self, url: impl Into<String>) -> AnalyticsConfig {
        self.settings_url = url.into();
        self
    }

    /// Override base URL for batch uploads. Clients should use the default in most cases.
    pub fn upload_url(mut self, url: impl Into<String>) -> AnalyticsConfig {
        self.upload_url = url.into();
        self
    }

    /// Queue size that triggers an automatic flush.
    pub fn flush_queue_size(mut self, size: usize) -> AnalyticsConfig {
        self.flush_queue_size = size;
        self
    }

    /// Interval of the periodic flush timer.
    pub fn flush_interval(mut self, interval: Duration) -> AnalyticsConfig {
        self.flush_interval = interval;
        self
    }

    /// Maximum number of buffered payloads; beyond it the oldest are dropped.
    pub fn queue_capacity(mut self, capacity: usize) -> AnalyticsConfig {
        self.queue_capacity = capacity;
        self
    }

    /// Switch generated timestamps between millisecond and nanosecond precision.
    pub fn timestamp_precision(mut self, precision: TimestampPrecision) -> AnalyticsConfig {
        self.timestamp_precision = precision;
        self
    }

    /// Compiled-in settings used when neither the network nor the cache can provide a snapshot.
    /// The built-in collector entry is merged in on top; defaults never override it.
    pub fn default_settings(mut self, settings: ProjectSettings) -> AnalyticsConfig {
        self.default_settings = settings;
        self
    }

    /// Options merged under every call's per-call options.
    pub fn default_options(mut self, options: Options) -> AnalyticsConfig {
        self.default_options = options;
        self
    }

    /// Register an integration factory. The integration is constructed lazily when its key first
    /// appears in a settings snapshot.
    pub fn factory(mut self, factory: impl IntegrationFactory + 'static) -> AnalyticsConfig {
        self.factories.push(Box::new(factory));
        self
    }

    /// Transform applied to upload bodies and to cached settings at rest.
    pub fn transform(mut self, transform: Arc<dyn Transform>) -> AnalyticsConfig {
        self.transform = transform;
        self
    }

    /// Emit Application Installed/Updated/Opened/Backgrounded events from lifecycle input.
    pub fn track_lifecycle_events(mut self, enabled: bool) -> AnalyticsConfig {
        self.track_lifecycle_events = enabled;
        self
    }

    /// Emit screen events from [`LifecycleEvent::ScreenViewed`] input.
    pub fn record_screen_views(mut self, enabled: bool) -> AnalyticsConfig {
        self.record_screen_views = enabled;
        self
    }

    /// Host application metadata reported in every payload's context.
    pub fn app_info(mut self, app: AppInfo) -> AnalyticsConfig {
        self.app = app;
        self
    }

    /// Device metadata reported in every payload's context.
    pub fn device_info(mut self, device: DeviceInfo) -> AnalyticsConfig {
        self.device = device;
        self
    }

    /// Enable or disable the background settings poller. Disabled, the instance runs on cached
    /// settings or compiled-in defaults.
    pub fn refresh_settings(mut self, enabled: bool) -> AnalyticsConfig {
        self.refresh_settings = enabled;
        self
    }

    /// Poll interval/jitter for the settings poller.
    pub fn poller_config(mut self, config: SettingsPollerConfig) -> AnalyticsConfig {
        self.poller_config = config;
        self
    }

    /// Substitute the dispatch worker. Tests use [`crate::task_runner::InlineRunner`] to make
    /// flushes synchronous.
    pub fn task_runner(mut self, runner: Arc<dyn TaskRunner>) -> AnalyticsConfig {
        self.runner = Some(runner);
        self
    }

    /// Substitute the upload port.
    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> AnalyticsConfig {
        self.uploader = Some(uploader);
        self
    }

    /// Substitute the traits cache.
    pub fn traits_cache(mut self, cache: Arc<dyn Cache<Traits>>) -> AnalyticsConfig {
        self.traits_cache = Some(cache);
        self
    }

    /// Substitute the settings cache.
    pub fn settings_cache(mut self, cache: Arc<dyn Cache<ProjectSettings>>) -> AnalyticsConfig {
        self.settings_cache = Some(cache);
        self
    }

    /// Substitute the opt-out flag cache.
    pub fn opt_out_cache(mut self, cache: Arc<dyn Cache<bool>>) -> AnalyticsConfig {
        self.opt_out_cache = Some(cache);
        self
    }

    /// Substitute the app-version bookkeeping cache.
    pub fn app_version_cache(mut self, cache: Arc<dyn Cache<AppVersion>>) -> AnalyticsConfig {
        self.app_version_cache = Some(cache);
        self
    }
}

/// One SDK instance: accepts identify/track/screen/group/alias calls, enriches them into
/// immutable payloads, and delivers them to the selected integrations and the durable dispatch
/// queue.
///
/// All methods take `&self` and are safe to call from any thread. Validation errors surface
/// synchronously; queue and network failures never do.
pub struct Analytics {
    tag: String,
    precision: TimestampPrecision,
    default_options: Options,
    app: AppInfo,
    context: Mutex<AnalyticsContext>,
    traits_cache: Arc<dyn Cache<Traits>>,
    opt_out_cache: Arc<dyn Cache<bool>>,
    app_version_cache: Arc<dyn Cache<AppVersion>>,
    opted_out: AtomicBool,
    settings_store: Arc<SettingsStore>,
    registry: Arc<IntegrationRegistry>,
    dispatcher: Dispatcher,
    poller: Mutex<Option<SettingsPoller>>,
    instances: Weak<InstanceRegistry>,
    is_shutdown: AtomicBool,
    is_singleton: AtomicBool,
    track_lifecycle_events: bool,
    record_screen_views: bool,
    opened_before: AtomicBool,
}

impl Analytics {
    /// Build an instance from `config` and register it under its tag.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty write key.
    /// - [`Error::DuplicateTag`] if a live instance already holds the tag.
    /// - [`Error::InvalidBaseUrl`] for a malformed upload URL.
    /// - [`Error::Io`] if local storage cannot be initialized.
    pub fn create(
        config: AnalyticsConfig,
        instances: &Arc<InstanceRegistry>,
    ) -> Result<Arc<Analytics>> {
        if config.write_key.trim().is_empty() {
            return Err(Error::InvalidArgument("write_key must not be empty."));
        }
        let tag = config.tag.clone().unwrap_or_else(|| config.write_key.clone());
        let dir = config.data_dir.join(&tag);

        let traits_cache: Arc<dyn Cache<Traits>> = match config.traits_cache {
            Some(cache) => cache,
            None => Arc::new(FileCache::<Traits>::new(&dir, "traits.json")?),
        };
        let settings_cache: Arc<dyn Cache<ProjectSettings>> = match config.settings_cache {
            Some(cache) => cache,
            None => Arc::new(FileCache::<ProjectSettings>::with_transform(
                &dir,
                "settings.json",
                config.transform.clone(),
            )?),
        };
        let opt_out_cache: Arc<dyn Cache<bool>> = match config.opt_out_cache {
            Some(cache) => cache,
            None => Arc::new(FileCache::<bool>::new(&dir, "opt-out.json")?),
        };
        let app_version_cache: Arc<dyn Cache<AppVersion>> = match config.app_version_cache {
            Some(cache) => cache,
            None => Arc::new(FileCache::<AppVersion>::new(&dir, "app-version.json")?),
        };

        // Read once at startup; an identity without an anonymous id is repaired here.
        let traits = match traits_cache.get() {
            Some(cached) if cached.anonymous_id().is_some() => cached,
            Some(cached) => {
                let mut traits = Traits::anonymous();
                traits.merge(&cached);
                traits
            }
            None => Traits::anonymous(),
        };
        traits_cache.set(&traits);
        let context = AnalyticsContext::new(config.app.clone(), config.device, traits);

        let initial_settings = settings_cache.get().unwrap_or_else(|| {
            ProjectSettings::with_defaults(&config.default_settings, &config.write_key)
        });
        let settings_store = Arc::new(SettingsStore::new(initial_settings));
        let registry = Arc::new(IntegrationRegistry::new(config.factories));
        registry.accept_settings(&settings_store.settings());

        let uploader: Arc<dyn Uploader> = match config.uploader {
            Some(uploader) => uploader,
            None => Arc::new(BatchUploader::new(
                &config.upload_url,
                config.write_key.clone(),
                config.transform.clone(),
            )?),
        };
        let runner: Arc<dyn TaskRunner> = match config.runner {
            Some(runner) => runner,
            None => Arc::new(ThreadRunner::new()?),
        };
        let queue = PayloadQueue::open(dir.join("queue.jsonl"), config.queue_capacity)?;
        let dispatcher = Dispatcher::new(
            queue,
            uploader,
            runner,
            DispatcherConfig {
                batch_size: config.flush_queue_size,
                flush_interval: config.flush_interval,
            },
        )?;

        let opted_out = opt_out_cache.get().unwrap_or(false);

        let analytics = Arc::new(Analytics {
            tag: tag.clone(),
            precision: config.timestamp_precision,
            default_options: config.default_options,
            app: config.app,
            context: Mutex::new(context),
            traits_cache,
            opt_out_cache,
            app_version_cache,
            opted_out: AtomicBool::new(opted_out),
            settings_store: settings_store.clone(),
            registry: registry.clone(),
            dispatcher,
            poller: Mutex::new(None),
            instances: Arc::downgrade(instances),
            is_shutdown: AtomicBool::new(false),
            is_singleton: AtomicBool::new(false),
            track_lifecycle_events: config.track_lifecycle_events,
            record_screen_views: config.record_screen_views,
            opened_before: AtomicBool::new(false),
        });

        if let Err(err) = instances.register(&tag, &analytics) {
            analytics.shutdown_inner();
            return Err(err);
        }

        if config.refresh_settings {
            let fetcher = SettingsFetcher::new(SettingsFetcherConfig {
                base_url: config.settings_url,
                write_key: config.write_key,
                sdk_name: "beacon-rust".to_owned(),
                sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
            });
            match SettingsPoller::start_with_config(
                fetcher,
                settings_store,
                settings_cache,
                registry,
                config.poller_config,
            ) {
                Ok(poller) => {
                    *analytics.poller.lock().expect("poller lock poisoned") = Some(poller);
                }
                Err(err) => {
                    analytics.shutdown_inner();
                    return Err(err.into());
                }
            }
        }

        Ok(analytics)
    }

    /// Associate the current user with `user_id` and merge `traits` into their persistent
    /// profile.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless a user id or at least one trait is provided;
    /// [`Error::Shutdown`] after shutdown.
    pub fn identify(
        &self,
        user_id: Option<&str>,
        traits: Option<Traits>,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        let no_user = user_id.map_or(true, |id| id.trim().is_empty());
        let no_traits = traits.as_ref().map_or(true, |traits| traits.is_empty());
        if no_user && no_traits {
            return Err(Error::InvalidArgument(
                "either user_id or some traits must be provided.",
            ));
        }

        let body = {
            let mut context = self.context.lock().expect("context lock poisoned");
            let current = context.traits_mut();
            if let Some(id) = user_id {
                if !id.trim().is_empty() {
                    current.set_user_id(id);
                }
            }
            if let Some(new) = &traits {
                current.merge(new);
            }
            self.traits_cache.set(current);
            Body::Identify {
                traits: current.clone(),
            }
        };

        self.send(PayloadType::Identify, body, options, None)
    }

    /// Record a user action.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty event name; [`Error::Shutdown`] after shutdown.
    pub fn track(
        &self,
        event: &str,
        properties: Option<Properties>,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        if event.trim().is_empty() {
            return Err(Error::InvalidArgument("event must not be empty."));
        }

        self.send(
            PayloadType::Track,
            Body::Track {
                event: event.to_owned(),
                properties: properties.unwrap_or_default(),
            },
            options,
            None,
        )
    }

    /// Record a screen view.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless a category or a name is provided; [`Error::Shutdown`]
    /// after shutdown.
    pub fn screen(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Option<Properties>,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        let no_category = category.map_or(true, |c| c.trim().is_empty());
        let no_name = name.map_or(true, |n| n.trim().is_empty());
        if no_category && no_name {
            return Err(Error::InvalidArgument(
                "either category or name must be provided.",
            ));
        }

        self.send(
            PayloadType::Screen,
            Body::Screen {
                name: name.filter(|n| !n.trim().is_empty()).map(str::to_owned),
                category: category.filter(|c| !c.trim().is_empty()).map(str::to_owned),
                properties: properties.unwrap_or_default(),
            },
            options,
            None,
        )
    }

    /// Associate the current user with a group.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty group id; [`Error::Shutdown`] after shutdown.
    pub fn group(
        &self,
        group_id: &str,
        traits: Option<Traits>,
        options: Option<&Options>,
    ) -> Result<()> {
        self.ensure_running()?;
        if group_id.trim().is_empty() {
            return Err(Error::InvalidArgument("group_id must not be empty."));
        }

        self.send(
            PayloadType::Group,
            Body::Group {
                group_id: group_id.to_owned(),
                traits: traits.unwrap_or_default(),
            },
            options,
            None,
        )
    }

    /// Link the current identity to a new user id. `previousId` is the identity known so far:
    /// the user id after an identify, the anonymous id before any.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty new id; [`Error::Shutdown`] after shutdown.
    pub fn alias(&self, new_id: &str, options: Option<&Options>) -> Result<()> {
        self.ensure_running()?;
        if new_id.trim().is_empty() {
            return Err(Error::InvalidArgument("new_id must not be empty."));
        }

        let previous_id = {
            let context = self.context.lock().expect("context lock poisoned");
            context.traits().current_id().unwrap_or_default().to_owned()
        };

        self.send(
            PayloadType::Alias,
            Body::Alias { previous_id },
            options,
            Some(new_id.to_owned()),
        )
    }

    /// Request an upload of buffered payloads and fan a flush out to all integrations. Returns
    /// immediately; the upload happens on the dispatch worker.
    pub fn flush(&self) -> Result<()> {
        self.ensure_running()?;
        self.dispatcher.flush()?;
        self.registry.flush_all();
        Ok(())
    }

    /// Forget the current user: clears persisted traits, generates a fresh anonymous identity,
    /// and fans a reset out to all integrations.
    pub fn reset(&self) -> Result<()> {
        self.ensure_running()?;
        {
            let mut context = self.context.lock().expect("context lock poisoned");
            let fresh = context.reset();
            self.traits_cache.delete();
            self.traits_cache.set(&fresh);
        }
        self.registry.reset_all();
        Ok(())
    }

    /// Globally enable or disable event collection. While opted out, calls succeed but reach no
    /// integration. Persisted across restarts.
    pub fn opt_out(&self, opt_out: bool) {
        self.opted_out.store(opt_out, Ordering::Release);
        self.opt_out_cache.set(&opt_out);
    }

    /// Register `callback` to run once the integration under `key` is constructed, immediately
    /// if it already is.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty key.
    pub fn on_integration_ready<F>(&self, key: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Integration) + Send + 'static,
    {
        self.registry.on_ready(key, Box::new(callback))
    }

    /// Feed one host lifecycle event into the SDK. The raw event is forwarded to every
    /// integration; install/update/open bookkeeping happens here when the corresponding
    /// configuration flags are on.
    pub fn handle_lifecycle_event(&self, event: LifecycleEvent) -> Result<()> {
        self.ensure_running()?;
        self.registry.lifecycle_all(&event);

        match &event {
            LifecycleEvent::ApplicationStarted { version, build } => {
                if self.track_lifecycle_events {
                    self.track_version_change(version, build)?;
                }
            }
            LifecycleEvent::ApplicationForegrounded => {
                if self.track_lifecycle_events {
                    let from_background = self.opened_before.swap(true, Ordering::AcqRel);
                    self.track(
                        "Application Opened",
                        Some(object(json!({
                            "from_background": from_background,
                            "version": self.app.version,
                            "build": self.app.build,
                        }))),
                        None,
                    )?;
                }
            }
            LifecycleEvent::ApplicationBackgrounded => {
                if self.track_lifecycle_events {
                    self.track("Application Backgrounded", None, None)?;
                }
            }
            LifecycleEvent::ScreenViewed { name } => {
                if self.record_screen_views {
                    self.screen(None, Some(name), None, None)?;
                }
            }
        }
        Ok(())
    }

    fn track_version_change(&self, version: &str, build: &str) -> Result<()> {
        match self.app_version_cache.get() {
            None => {
                self.track(
                    "Application Installed",
                    Some(object(json!({ "version": version, "build": build }))),
                    None,
                )?;
            }
            Some(previous) if previous.build != build => {
                self.track(
                    "Application Updated",
                    Some(object(json!({
                        "previous_version": previous.version,
                        "previous_build": previous.build,
                        "version": version,
                        "build": build,
                    }))),
                    None,
                )?;
            }
            Some(_) => return Ok(()),
        }
        self.app_version_cache.set(&AppVersion {
            version: version.to_owned(),
            build: build.to_owned(),
        });
        Ok(())
    }

    /// Stop background work, free this instance's tag, and reject further calls. Idempotent.
    ///
    /// # Errors
    ///
    /// [`Error::SingletonShutdown`] if this instance was promoted to the process singleton.
    pub fn shutdown(&self) -> Result<()> {
        if self.is_singleton.load(Ordering::Acquire) {
            return Err(Error::SingletonShutdown);
        }
        self.shutdown_inner();
        Ok(())
    }

    pub(crate) fn shutdown_inner(&self) {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(poller) = self.poller.lock().expect("poller lock poisoned").take() {
            if poller.shutdown().is_err() {
                log::error!(target: "beacon", "settings poller panicked");
            }
        }
        self.dispatcher.shutdown();
        if let Some(instances) = self.instances.upgrade() {
            instances.release(&self.tag);
        }
        log::debug!(target: "beacon", "client {} shut down", self.tag);
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn mark_singleton(&self) {
        self.is_singleton.store(true, Ordering::Release);
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The currently-active settings snapshot.
    pub fn settings(&self) -> Arc<ProjectSettings> {
        self.settings_store.settings()
    }

    /// A snapshot of the current user traits.
    pub fn traits(&self) -> Traits {
        self.context
            .lock()
            .expect("context lock poisoned")
            .traits()
            .clone()
    }

    /// Block until the first settings refresh resolves. No-op when the poller is disabled.
    pub fn wait_for_settings(&self) -> Result<()> {
        let poller = self.poller.lock().expect("poller lock poisoned");
        match &*poller {
            Some(poller) => poller.wait_for_settings(),
            None => Ok(()),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn send(
        &self,
        kind: PayloadType,
        body: Body,
        options: Option<&Options>,
        user_id_override: Option<String>,
    ) -> Result<()> {
        let options = Options::merged(&self.default_options, options);
        let (context, anonymous_id, stored_user_id) = {
            let context = self.context.lock().expect("context lock poisoned");
            (
                context.to_payload_context(options.context()),
                context
                    .traits()
                    .anonymous_id()
                    .unwrap_or_default()
                    .to_owned(),
                context.traits().user_id().map(str::to_owned),
            )
        };
        let user_id = user_id_override.or(stored_user_id);

        let payload = Payload::new(
            kind,
            body,
            anonymous_id,
            user_id,
            context,
            Utc::now(),
            self.precision,
        );
        self.deliver(payload, &options);
        Ok(())
    }

    // Routing and both sinks. Failures past this point are absorbed: reporting is
    // fire-and-forget for the producer.
    fn deliver(&self, payload: Payload, options: &Options) {
        let settings = self.settings_store.settings();
        let mut candidates = self.registry.keys();
        candidates.insert(COLLECTOR_INTEGRATION_KEY.to_owned());

        let mut selected = routing::deliverable_integrations(
            &payload,
            &settings,
            options,
            self.opted_out.load(Ordering::Acquire),
            &candidates,
        );

        if selected.remove(COLLECTOR_INTEGRATION_KEY) {
            match serde_json::to_string(&payload) {
                Ok(line) => {
                    if self.dispatcher.enqueue(line).is_err() {
                        log::debug!(target: "beacon", "dropping payload enqueued during shutdown");
                    }
                }
                Err(err) => {
                    log::warn!(target: "beacon", "failed to serialize payload: {}", err);
                }
            }
        }

        self.registry.dispatch(&selected, &payload);
    }
}

fn object(value: serde_json::Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::options::ALL_INTEGRATIONS_KEY;
    use crate::payload::JsonMap;
    use crate::task_runner::InlineRunner;
    use crate::uploader::UploadError;

    const SETTINGS: &str = r#"{"integrations":{"test":{"foo":"bar"}}}"#;
    const SETTINGS_WITH_COLLECTOR: &str =
        r#"{"integrations":{"test":{"foo":"bar"},"Beacon":{"apiKey":"qaz"}}}"#;

    #[derive(Clone, Default)]
    struct Recorder(Arc<StdMutex<Vec<(&'static str, Option<Payload>)>>>);

    impl Recorder {
        fn push(&self, method: &'static str, payload: Option<&Payload>) {
            self.0.lock().unwrap().push((method, payload.cloned()));
        }

        fn names(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().iter().map(|(name, _)| *name).collect()
        }

        fn payloads_of(&self, method: &'static str) -> Vec<Payload> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| *name == method)
                .filter_map(|(_, payload)| payload.clone())
                .collect()
        }

        fn event_calls(&self) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| *name != "lifecycle")
                .count()
        }
    }

    struct RecordingIntegration {
        calls: Recorder,
    }

    impl Integration for RecordingIntegration {
        fn identify(&mut self, payload: &Payload) {
            self.calls.push("identify", Some(payload));
        }
        fn group(&mut self, payload: &Payload) {
            self.calls.push("group", Some(payload));
        }
        fn track(&mut self, payload: &Payload) {
            self.calls.push("track", Some(payload));
        }
        fn alias(&mut self, payload: &Payload) {
            self.calls.push("alias", Some(payload));
        }
        fn screen(&mut self, payload: &Payload) {
            self.calls.push("screen", Some(payload));
        }
        fn flush(&mut self) {
            self.calls.push("flush", None);
        }
        fn reset(&mut self) {
            self.calls.push("reset", None);
        }
        fn lifecycle(&mut self, _event: &LifecycleEvent) {
            self.calls.push("lifecycle", None);
        }
    }

    struct RecorderFactory {
        calls: Recorder,
    }

    impl IntegrationFactory for RecorderFactory {
        fn key(&self) -> &str {
            "test"
        }

        fn create(&self, _settings: &JsonMap) -> Option<Box<dyn Integration>> {
            Some(Box::new(RecordingIntegration {
                calls: self.calls.clone(),
            }))
        }
    }

    struct RecordingUploader {
        batches: StdMutex<Vec<Vec<String>>>,
    }

    impl RecordingUploader {
        fn new() -> RecordingUploader {
            RecordingUploader {
                batches: StdMutex::new(Vec::new()),
            }
        }

        fn uploaded(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl Uploader for RecordingUploader {
        fn upload(&self, batch: &[String]) -> std::result::Result<(), UploadError> {
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        instances: Arc<InstanceRegistry>,
        analytics: Arc<Analytics>,
        calls: Recorder,
        uploader: Arc<RecordingUploader>,
        traits_cache: Arc<MemoryCache<Traits>>,
        opt_out_cache: Arc<MemoryCache<bool>>,
    }

    fn fixture() -> Fixture {
        fixture_with(SETTINGS, |config| config)
    }

    fn fixture_with(
        settings: &str,
        customize: impl FnOnce(AnalyticsConfig) -> AnalyticsConfig,
    ) -> Fixture {
        let instances = Arc::new(InstanceRegistry::new());
        build(&instances, settings, customize).expect("fixture creation failed")
    }

    fn build(
        instances: &Arc<InstanceRegistry>,
        settings: &str,
        customize: impl FnOnce(AnalyticsConfig) -> AnalyticsConfig,
    ) -> Result<Fixture> {
        let dir = tempfile::tempdir().unwrap();
        let calls = Recorder::default();
        let uploader = Arc::new(RecordingUploader::new());
        let traits_cache = Arc::new(MemoryCache::new());
        let opt_out_cache = Arc::new(MemoryCache::new());
        let settings_cache: Arc<MemoryCache<ProjectSettings>> = Arc::new(MemoryCache::new());
        settings_cache.set(&serde_json::from_str(settings).unwrap());

        let config = AnalyticsConfig::from_write_key("qaz")
            .data_dir(dir.path())
            .refresh_settings(false)
            .flush_interval(Duration::from_secs(3600))
            .task_runner(Arc::new(InlineRunner))
            .uploader(uploader.clone())
            .traits_cache(traits_cache.clone())
            .opt_out_cache(opt_out_cache.clone())
            .settings_cache(settings_cache)
            .app_version_cache(Arc::new(MemoryCache::<AppVersion>::new()))
            .factory(RecorderFactory {
                calls: calls.clone(),
            });

        let analytics = Analytics::create(customize(config), instances)?;

        Ok(Fixture {
            _dir: dir,
            instances: instances.clone(),
            analytics,
            calls,
            uploader,
            traits_cache,
            opt_out_cache,
        })
    }

    fn set_settings(fixture: &Fixture, json: &str) {
        fixture
            .analytics
            .settings_store
            .set_settings(Arc::new(serde_json::from_str(json).unwrap()));
    }

    #[test]
    fn identify_without_user_or_traits_is_rejected() {
        let fixture = fixture();

        let err = fixture.analytics.identify(None, None, None).unwrap_err();

        assert_eq!(
            err.to_string(),
            "either user_id or some traits must be provided."
        );
        assert_eq!(fixture.calls.event_calls(), 0);
    }

    #[test]
    fn identify_merges_traits_and_updates_cache() {
        let fixture = fixture();

        fixture
            .analytics
            .identify(Some("foo"), Some(Traits::new().put("bar", "qaz")), None)
            .unwrap();

        let traits = fixture.analytics.traits();
        assert_eq!(traits.user_id(), Some("foo"));
        assert_eq!(traits.get("bar").unwrap(), "qaz");
        assert_eq!(fixture.traits_cache.get().unwrap(), traits);

        let payloads = fixture.calls.payloads_of("identify");
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].user_id.as_deref(), Some("foo"));
        match &payloads[0].body {
            Body::Identify { traits } => assert_eq!(traits.get("bar").unwrap(), "qaz"),
            body => panic!("expected identify body, got {body:?}"),
        }
    }

    #[test]
    fn successive_identifies_accumulate_traits() {
        let fixture = fixture();

        fixture
            .analytics
            .identify(Some("foo"), Some(Traits::new().put("bar", "qaz")), None)
            .unwrap();
        fixture
            .analytics
            .identify(None, Some(Traits::new().put("seats", 3)), None)
            .unwrap();

        let traits = fixture.analytics.traits();
        assert_eq!(traits.user_id(), Some("foo"));
        assert_eq!(traits.get("bar").unwrap(), "qaz");
        assert_eq!(traits.get("seats").unwrap(), 3);
    }

    #[test]
    fn group_requires_a_group_id() {
        let fixture = fixture();

        let err = fixture.analytics.group("", None, None).unwrap_err();

        assert_eq!(err.to_string(), "group_id must not be empty.");
    }

    #[test]
    fn group_delivers_group_id_and_traits() {
        let fixture = fixture();

        fixture
            .analytics
            .group("acme", Some(Traits::new().put("employees", 42)), None)
            .unwrap();

        let payloads = fixture.calls.payloads_of("group");
        match &payloads[0].body {
            Body::Group { group_id, traits } => {
                assert_eq!(group_id, "acme");
                assert_eq!(traits.get("employees").unwrap(), 42);
            }
            body => panic!("expected group body, got {body:?}"),
        }
    }

    #[test]
    fn track_requires_an_event_name() {
        let fixture = fixture();

        for event in ["", "   "] {
            let err = fixture.analytics.track(event, None, None).unwrap_err();
            assert_eq!(err.to_string(), "event must not be empty.");
        }
        assert_eq!(fixture.calls.event_calls(), 0);
    }

    #[test]
    fn track_delivers_event_and_properties() {
        let fixture = fixture();

        fixture
            .analytics
            .track(
                "wrote tests",
                Some(object(json!({"url": "github.com"}))),
                None,
            )
            .unwrap();

        let payloads = fixture.calls.payloads_of("track");
        match &payloads[0].body {
            Body::Track { event, properties } => {
                assert_eq!(event, "wrote tests");
                assert_eq!(properties["url"], "github.com");
            }
            body => panic!("expected track body, got {body:?}"),
        }
    }

    #[test]
    fn screen_requires_category_or_name() {
        let fixture = fixture();

        for (category, name) in [(None, None), (Some(""), Some(""))] {
            let err = fixture
                .analytics
                .screen(category, name, None, None)
                .unwrap_err();
            assert_eq!(err.to_string(), "either category or name must be provided.");
        }
    }

    #[test]
    fn screen_delivers_name_category_and_properties() {
        let fixture = fixture();

        fixture
            .analytics
            .screen(
                Some("android"),
                Some("saw tests"),
                Some(object(json!({"url": "github.com"}))),
                None,
            )
            .unwrap();

        let payloads = fixture.calls.payloads_of("screen");
        match &payloads[0].body {
            Body::Screen {
                name,
                category,
                properties,
            } => {
                assert_eq!(name.as_deref(), Some("saw tests"));
                assert_eq!(category.as_deref(), Some("android"));
                assert_eq!(properties["url"], "github.com");
            }
            body => panic!("expected screen body, got {body:?}"),
        }
    }

    #[test]
    fn alias_requires_a_new_id() {
        let fixture = fixture();

        let err = fixture.analytics.alias("", None).unwrap_err();

        assert_eq!(err.to_string(), "new_id must not be empty.");
    }

    #[test]
    fn alias_uses_the_anonymous_id_before_any_identify() {
        let fixture = fixture();
        let anonymous_id = fixture.analytics.traits().anonymous_id().unwrap().to_owned();

        fixture.analytics.alias("foo", None).unwrap();

        let payloads = fixture.calls.payloads_of("alias");
        assert_eq!(payloads[0].user_id.as_deref(), Some("foo"));
        match &payloads[0].body {
            Body::Alias { previous_id } => assert_eq!(previous_id, &anonymous_id),
            body => panic!("expected alias body, got {body:?}"),
        }
    }

    #[test]
    fn alias_uses_the_cached_user_id_after_identify() {
        let fixture = fixture();

        fixture
            .analytics
            .identify(Some("prayansh"), Some(Traits::new().put("bar", "qaz")), None)
            .unwrap();
        fixture.analytics.alias("foo", None).unwrap();

        let payloads = fixture.calls.payloads_of("alias");
        assert_eq!(payloads[0].user_id.as_deref(), Some("foo"));
        match &payloads[0].body {
            Body::Alias { previous_id } => assert_eq!(previous_id, "prayansh"),
            body => panic!("expected alias body, got {body:?}"),
        }
    }

    #[test]
    fn options_disable_integrations_by_name_and_wildcard() {
        let fixture = fixture();

        for options in [
            Options::new().set_integration("test", false),
            Options::new().set_integration(ALL_INTEGRATIONS_KEY, false),
        ] {
            fixture
                .analytics
                .screen(Some("foo"), Some("bar"), None, Some(&options))
                .unwrap();
            fixture.analytics.track("foo", None, Some(&options)).unwrap();
            fixture.analytics.group("foo", None, Some(&options)).unwrap();
            fixture
                .analytics
                .identify(Some("foo"), None, Some(&options))
                .unwrap();
            fixture.analytics.alias("foo", Some(&options)).unwrap();
        }

        assert_eq!(fixture.calls.event_calls(), 0);
        assert!(fixture.uploader.uploaded().is_empty());
    }

    #[test]
    fn options_context_applies_to_one_payload_only() {
        let fixture = fixture();

        fixture
            .analytics
            .track(
                "foo",
                None,
                Some(&Options::new().put_context("from_tests", true)),
            )
            .unwrap();
        fixture.analytics.track("bar", None, None).unwrap();

        let payloads = fixture.calls.payloads_of("track");
        assert_eq!(payloads[0].context["from_tests"], true);
        assert!(payloads[1].context.get("from_tests").is_none());
    }

    #[test]
    fn default_options_apply_under_per_call_options() {
        let fixture = fixture_with(SETTINGS, |config| {
            config.default_options(Options::new().put_context("channel", "mobile"))
        });

        fixture
            .analytics
            .track(
                "foo",
                None,
                Some(&Options::new().put_context("from_tests", true)),
            )
            .unwrap();

        let payloads = fixture.calls.payloads_of("track");
        assert_eq!(payloads[0].context["channel"], "mobile");
        assert_eq!(payloads[0].context["from_tests"], true);
    }

    #[test]
    fn opt_out_disables_events_until_reenabled() {
        let fixture = fixture();

        fixture.analytics.opt_out(true);
        fixture.analytics.track("foo", None, None).unwrap();
        assert_eq!(fixture.calls.event_calls(), 0);
        assert_eq!(fixture.opt_out_cache.get(), Some(true));

        fixture.analytics.opt_out(false);
        fixture.analytics.track("foo", None, None).unwrap();
        assert_eq!(fixture.calls.payloads_of("track").len(), 1);
    }

    #[test]
    fn plan_disabled_event_reaches_nothing_even_with_option_overrides() {
        let fixture = fixture();
        set_settings(
            &fixture,
            r#"{"integrations":{"test":{"foo":"bar"}},
                "plan":{"track":{"foo":{"enabled":false}}}}"#,
        );

        fixture.analytics.track("foo", None, None).unwrap();
        fixture
            .analytics
            .track("foo", None, Some(&Options::new().set_integration("test", true)))
            .unwrap();

        assert_eq!(fixture.calls.event_calls(), 0);
    }

    #[test]
    fn plan_per_integration_disable_is_restored_by_explicit_option() {
        let fixture = fixture();
        set_settings(
            &fixture,
            r#"{"integrations":{"test":{"foo":"bar"}},
                "plan":{"track":{"foo":{"enabled":true,"integrations":{"test":false}}}}}"#,
        );

        fixture.analytics.track("foo", None, None).unwrap();
        assert_eq!(fixture.calls.event_calls(), 0);

        fixture
            .analytics
            .track("foo", None, Some(&Options::new().set_integration("test", true)))
            .unwrap();
        assert_eq!(fixture.calls.payloads_of("track").len(), 1);
    }

    #[test]
    fn collector_payloads_are_queued_and_uploaded_on_flush() {
        let fixture = fixture_with(SETTINGS_WITH_COLLECTOR, |config| config);

        fixture.analytics.track("foo", None, None).unwrap();
        assert!(fixture.uploader.uploaded().is_empty());

        fixture.analytics.flush().unwrap();

        let uploaded = fixture.uploader.uploaded();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].len(), 1);
        let payload: Payload = serde_json::from_str(&uploaded[0][0]).unwrap();
        assert_eq!(payload.event(), Some("foo"));
        // The in-process integration got the same event, and the flush fan-out.
        assert_eq!(fixture.calls.payloads_of("track").len(), 1);
        assert!(fixture.calls.names().contains(&"flush"));
    }

    #[test]
    fn reaching_flush_queue_size_uploads_without_an_explicit_flush() {
        let fixture = fixture_with(SETTINGS_WITH_COLLECTOR, |config| {
            config.flush_queue_size(2)
        });

        fixture.analytics.track("one", None, None).unwrap();
        assert!(fixture.uploader.uploaded().is_empty());
        fixture.analytics.track("two", None, None).unwrap();

        assert_eq!(fixture.uploader.uploaded().len(), 1);
        assert_eq!(fixture.uploader.uploaded()[0].len(), 2);
    }

    #[test]
    fn reset_regenerates_the_anonymous_identity() {
        let fixture = fixture();
        fixture
            .analytics
            .identify(Some("foo"), Some(Traits::new().put("age", 20)), None)
            .unwrap();
        let old_anonymous_id = fixture.analytics.traits().anonymous_id().unwrap().to_owned();

        fixture.analytics.reset().unwrap();

        let traits = fixture.analytics.traits();
        assert_eq!(traits.len(), 1);
        assert_eq!(traits.user_id(), None);
        assert_ne!(traits.anonymous_id().unwrap(), old_anonymous_id);
        assert_eq!(fixture.traits_cache.get().unwrap(), traits);
        assert!(fixture.calls.names().contains(&"reset"));
    }

    #[test]
    fn shutdown_is_idempotent_and_rejects_subsequent_calls() {
        let fixture = fixture();
        assert!(!fixture.analytics.is_shutdown());

        fixture.analytics.shutdown().unwrap();
        fixture.analytics.shutdown().unwrap();
        assert!(fixture.analytics.is_shutdown());

        assert!(matches!(
            fixture.analytics.track("foo", None, None),
            Err(Error::Shutdown)
        ));
        assert!(matches!(fixture.analytics.flush(), Err(Error::Shutdown)));
        assert_eq!(fixture.calls.event_calls(), 0);
    }

    #[test]
    fn duplicate_tag_is_rejected_until_the_holder_shuts_down() {
        let fixture = fixture();

        let duplicate = build(&fixture.instances, SETTINGS, |config| config);
        assert!(matches!(duplicate, Err(Error::DuplicateTag(tag)) if tag == "qaz"));

        fixture.analytics.shutdown().unwrap();
        assert!(fixture.instances.lookup("qaz").is_none());

        let reused = build(&fixture.instances, SETTINGS, |config| config);
        assert!(reused.is_ok());
    }

    #[test]
    fn lookup_returns_the_registered_instance() {
        let fixture = fixture();

        let found = fixture.instances.lookup("qaz").unwrap();

        assert!(Arc::ptr_eq(&found, &fixture.analytics));
    }

    #[test]
    fn singleton_can_be_set_once_and_refuses_shutdown() {
        let fixture = fixture();

        fixture
            .instances
            .promote(fixture.analytics.clone())
            .unwrap();
        assert!(Arc::ptr_eq(
            &fixture.instances.singleton().unwrap(),
            &fixture.analytics
        ));

        assert!(matches!(
            fixture.instances.promote(fixture.analytics.clone()),
            Err(Error::SingletonAlreadySet)
        ));
        assert!(matches!(
            fixture.analytics.shutdown(),
            Err(Error::SingletonShutdown)
        ));
        // The instance stays usable.
        fixture.analytics.track("foo", None, None).unwrap();
        assert_eq!(fixture.calls.payloads_of("track").len(), 1);
    }

    #[test]
    fn empty_write_key_is_rejected() {
        let instances = Arc::new(InstanceRegistry::new());

        let result = Analytics::create(AnalyticsConfig::from_write_key("  "), &instances);

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn missing_cache_falls_back_to_defaults_plus_collector() {
        let instances = Arc::new(InstanceRegistry::new());
        let dir = tempfile::tempdir().unwrap();
        let defaults: ProjectSettings = serde_json::from_str(
            r#"{"integrations":{"Adjust":{"appToken":"<>","trackAttributionData":true}}}"#,
        )
        .unwrap();

        let analytics = Analytics::create(
            AnalyticsConfig::from_write_key("qaz")
                .data_dir(dir.path())
                .refresh_settings(false)
                .task_runner(Arc::new(InlineRunner))
                .uploader(Arc::new(RecordingUploader::new()))
                .settings_cache(Arc::new(MemoryCache::<ProjectSettings>::new()))
                .default_settings(defaults),
            &instances,
        )
        .unwrap();

        let settings = analytics.settings();
        assert_eq!(settings.integrations.len(), 2);
        assert!(settings.has_integration("Adjust"));
        assert_eq!(settings.integrations[COLLECTOR_INTEGRATION_KEY]["apiKey"], "qaz");
    }

    fn assert_fraction_digits(timestamp: &str, digits: usize) {
        let dot = timestamp.find('.').expect("timestamp has fraction");
        let fraction = &timestamp[dot + 1..timestamp.len() - 1];
        assert_eq!(fraction.len(), digits, "timestamp {timestamp}");
        assert!(fraction.bytes().all(|b| b.is_ascii_digit()));
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn millisecond_timestamps_by_default() {
        let fixture = fixture();

        fixture.analytics.track("foo", None, None).unwrap();

        let payloads = fixture.calls.payloads_of("track");
        assert_fraction_digits(&payloads[0].timestamp, 3);
    }

    #[test]
    fn nanosecond_timestamps_when_configured() {
        let fixture = fixture_with(SETTINGS, |config| {
            config.timestamp_precision(TimestampPrecision::Nanos)
        });

        fixture.analytics.track("foo", None, None).unwrap();

        let payloads = fixture.calls.payloads_of("track");
        assert_fraction_digits(&payloads[0].timestamp, 9);
    }

    #[test]
    fn first_start_tracks_application_installed_once() {
        let fixture = fixture_with(SETTINGS, |config| config.track_lifecycle_events(true));
        let started = LifecycleEvent::ApplicationStarted {
            version: "1.0.0".to_owned(),
            build: "100".to_owned(),
        };

        fixture.analytics.handle_lifecycle_event(started.clone()).unwrap();
        fixture.analytics.handle_lifecycle_event(started).unwrap();

        let tracks = fixture.calls.payloads_of("track");
        assert_eq!(tracks.len(), 1);
        match &tracks[0].body {
            Body::Track { event, properties } => {
                assert_eq!(event, "Application Installed");
                assert_eq!(properties["version"], "1.0.0");
                assert_eq!(properties["build"], "100");
            }
            body => panic!("expected track body, got {body:?}"),
        }
    }

    #[test]
    fn version_change_tracks_application_updated() {
        let fixture = fixture_with(SETTINGS, |config| config.track_lifecycle_events(true));

        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationStarted {
                version: "1.0.0".to_owned(),
                build: "100".to_owned(),
            })
            .unwrap();
        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationStarted {
                version: "1.0.1".to_owned(),
                build: "101".to_owned(),
            })
            .unwrap();

        let tracks = fixture.calls.payloads_of("track");
        assert_eq!(tracks.len(), 2);
        match &tracks[1].body {
            Body::Track { event, properties } => {
                assert_eq!(event, "Application Updated");
                assert_eq!(properties["previous_version"], "1.0.0");
                assert_eq!(properties["previous_build"], "100");
                assert_eq!(properties["version"], "1.0.1");
                assert_eq!(properties["build"], "101");
            }
            body => panic!("expected track body, got {body:?}"),
        }
    }

    #[test]
    fn foreground_background_produce_opened_and_backgrounded() {
        let fixture = fixture_with(SETTINGS, |config| config.track_lifecycle_events(true));

        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationForegrounded)
            .unwrap();
        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationBackgrounded)
            .unwrap();
        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationForegrounded)
            .unwrap();

        let tracks = fixture.calls.payloads_of("track");
        let events: Vec<_> = tracks
            .iter()
            .filter_map(|payload| payload.event().map(str::to_owned))
            .collect();
        assert_eq!(
            events,
            vec![
                "Application Opened",
                "Application Backgrounded",
                "Application Opened"
            ]
        );
        match (&tracks[0].body, &tracks[2].body) {
            (
                Body::Track {
                    properties: first, ..
                },
                Body::Track {
                    properties: third, ..
                },
            ) => {
                assert_eq!(first["from_background"], false);
                assert_eq!(third["from_background"], true);
            }
            bodies => panic!("expected track bodies, got {bodies:?}"),
        }
    }

    #[test]
    fn screen_views_are_recorded_when_enabled() {
        let fixture = fixture_with(SETTINGS, |config| config.record_screen_views(true));

        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ScreenViewed {
                name: "Foo".to_owned(),
            })
            .unwrap();

        let payloads = fixture.calls.payloads_of("screen");
        match &payloads[0].body {
            Body::Screen { name, .. } => assert_eq!(name.as_deref(), Some("Foo")),
            body => panic!("expected screen body, got {body:?}"),
        }
    }

    #[test]
    fn lifecycle_events_are_forwarded_but_tracked_only_when_enabled() {
        let fixture = fixture();

        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ApplicationForegrounded)
            .unwrap();
        fixture
            .analytics
            .handle_lifecycle_event(LifecycleEvent::ScreenViewed {
                name: "Foo".to_owned(),
            })
            .unwrap();

        assert_eq!(fixture.calls.event_calls(), 0);
        assert_eq!(
            fixture
                .calls
                .names()
                .iter()
                .filter(|name| **name == "lifecycle")
                .count(),
            2
        );
    }

    #[test]
    fn on_integration_ready_fires_for_constructed_integrations() {
        let fixture = fixture();
        let fired = Arc::new(AtomicBool::new(false));
        let observed = fired.clone();

        fixture
            .analytics
            .on_integration_ready("test", move |_| {
                observed.store(true, Ordering::SeqCst);
            })
            .unwrap();

        assert!(fired.load(Ordering::SeqCst));
        assert!(matches!(
            fixture.analytics.on_integration_ready("", |_| {}),
            Err(Error::InvalidArgument(_))
        ));
    }
}
