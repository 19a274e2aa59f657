//! The lifecycle orchestrator.
//!
//! [`App`] drives a process through boot → start → stop/restart. Each phase
//! triggers one of the app's hooks with a built-in terminal handler
//! appended: registered handlers run first, in priority order, each deciding
//! whether to advance the chain; the terminal performs the phase's real
//! work (assembling the runtime container, starting it, stopping it, or
//! replacing the process image).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{ConfigLoader, ConfigSection};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::hooks::{HandlerFunc, Hook, handler_fn};
use crate::logger::{LifecycleLogger, NopLogger};

/// Default phase timeout, matching the usual service-manager grace period.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Event dispatched on the boot hook.
///
/// Handlers accumulate container options and may install their own
/// lifecycle logger; the terminal handler assembles the container from
/// whatever was collected.
pub struct BootEvent<C: Container> {
    pub options: Vec<C::Option>,
    pub logger: Option<Arc<dyn LifecycleLogger>>,
    /// Copy of the app's config loader, so handlers can load their own
    /// sections.
    pub config: ConfigLoader,
}

/// Event dispatched on the start hook.
pub struct StartEvent {
    /// The phase deadline enforced on the container start.
    pub timeout: Duration,
}

/// Event dispatched on the stop hook.
pub struct StopEvent {
    /// The phase deadline enforced on the container stop.
    pub timeout: Duration,
    /// Whether this stop is the first half of a restart.
    pub restarting: bool,
}

/// Construction parameters for an [`App`].
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub loader: ConfigLoader,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            start_timeout: DEFAULT_TIMEOUT,
            stop_timeout: DEFAULT_TIMEOUT,
            loader: ConfigLoader::default(),
        }
    }
}

/// State owned exclusively by the orchestrator, shared with the built-in
/// terminal handlers.
struct RuntimeCell<C> {
    container: Mutex<Option<Arc<C>>>,
    logger: Mutex<Arc<dyn LifecycleLogger>>,
}

/// Replace the current process image; returns only on failure.
type ExecFn = fn() -> std::io::Error;

/// Lifecycle orchestrator over a runtime container `C`.
///
/// Register handlers on [`App::on_boot`], [`App::on_start`] and
/// [`App::on_stop`] during setup, then call [`App::run`] (or the individual
/// phases). Registration is expected to happen before triggering; the hooks
/// snapshot their registries per trigger.
pub struct App<C: Container> {
    name: String,
    version: String,
    start_timeout: Duration,
    stop_timeout: Duration,
    config: ConfigLoader,
    on_boot: Hook<BootEvent<C>>,
    on_start: Hook<StartEvent>,
    on_stop: Hook<StopEvent>,
    runtime: Arc<RuntimeCell<C>>,
    replace_process: ExecFn,
}

impl<C: Container> App<C> {
    pub fn new(config: AppConfig) -> Self {
        Self {
            name: config.name,
            version: config.version,
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
            config: config.loader,
            on_boot: Hook::new(),
            on_start: Hook::new(),
            on_stop: Hook::new(),
            runtime: Arc::new(RuntimeCell {
                container: Mutex::new(None),
                logger: Mutex::new(Arc::new(NopLogger)),
            }),
            replace_process: exec_self,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Extension point for the boot phase.
    pub fn on_boot(&self) -> &Hook<BootEvent<C>> {
        &self.on_boot
    }

    /// Extension point for the start phase.
    pub fn on_start(&self) -> &Hook<StartEvent> {
        &self.on_start
    }

    /// Extension point for the stop phase (also used by restart).
    pub fn on_stop(&self) -> &Hook<StopEvent> {
        &self.on_stop
    }

    /// Load a config section through the app's layered loader.
    pub fn load_config<T: ConfigSection>(&self) -> Result<T> {
        Ok(self.config.load()?)
    }

    /// Trigger the boot hook; its terminal assembles the runtime container
    /// from the options the handlers accumulated and installs the
    /// lifecycle logger.
    pub async fn boot(&self) -> Result<()> {
        tracing::debug!(app = %self.name, "booting");
        let mut event = BootEvent {
            options: Vec::new(),
            logger: Some(Arc::new(NopLogger)),
            config: self.config.clone(),
        };
        self.on_boot
            .trigger_with(&mut event, [self.assemble_handler()])
            .await
    }

    /// Trigger the start hook; its terminal starts the container under the
    /// configured start timeout.
    pub async fn start(&self) -> Result<()> {
        tracing::debug!(app = %self.name, "starting");
        let mut event = StartEvent {
            timeout: self.start_timeout,
        };
        self.on_start
            .trigger_with(&mut event, [self.start_handler()])
            .await
    }

    /// Trigger the stop hook; its terminal stops the container under the
    /// configured stop timeout.
    pub async fn stop(&self) -> Result<()> {
        tracing::debug!(app = %self.name, "stopping");
        let mut event = StopEvent {
            timeout: self.stop_timeout,
            restarting: false,
        };
        self.on_stop
            .trigger_with(&mut event, [self.stop_handler()])
            .await
    }

    /// Stop the container and replace the process image with a fresh
    /// invocation of the same executable, arguments and environment.
    ///
    /// Does not return on success. Unsupported off Unix: returns
    /// [`Error::RestartUnsupported`] without touching any state.
    pub async fn restart(&self) -> Result<()> {
        if !cfg!(unix) {
            return Err(Error::RestartUnsupported);
        }

        tracing::debug!(app = %self.name, "restarting");
        let mut event = StopEvent {
            timeout: self.stop_timeout,
            restarting: true,
        };
        self.on_stop
            .trigger_with(&mut event, [self.stop_handler(), self.restart_handler()])
            .await
    }

    /// Boot and start, then wait for either the container's own
    /// termination (stop and return) or an external restart request via
    /// SIGUSR1 (restart). Off Unix only the termination path is observed.
    pub async fn run(&self) -> Result<()> {
        self.boot().await?;
        self.start().await?;

        let container = self
            .runtime
            .container
            .lock()
            .await
            .clone()
            .ok_or(Error::NotBooted)?;

        self.wait_and_finish(container).await
    }

    #[cfg(unix)]
    async fn wait_and_finish(&self, container: Arc<C>) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        // The subscription lives only while run is active; dropping the
        // stream on return releases it.
        let mut restart_signal = signal(SignalKind::user_defined1()).map_err(Error::Signal)?;

        tokio::select! {
            cause = container.wait() => {
                self.runtime.logger.lock().await.stopping(&cause);
                self.stop().await
            }
            _ = restart_signal.recv() => {
                self.runtime.logger.lock().await.restart_requested();
                self.restart().await
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_and_finish(&self, container: Arc<C>) -> Result<()> {
        let cause = container.wait().await;
        self.runtime.logger.lock().await.stopping(&cause);
        self.stop().await
    }

    /// Boot terminal: consume the accumulated options and install the
    /// container and logger, exactly once per boot.
    fn assemble_handler(&self) -> HandlerFunc<BootEvent<C>> {
        let runtime = Arc::clone(&self.runtime);
        handler_fn(move |event: &mut BootEvent<C>, next| {
            let runtime = Arc::clone(&runtime);
            Box::pin(async move {
                let logger = event.logger.take().ok_or(Error::MissingLogger)?;
                let container =
                    C::build(std::mem::take(&mut event.options)).map_err(Error::Boot)?;
                *runtime.logger.lock().await = logger;
                *runtime.container.lock().await = Some(Arc::new(container));
                next.run(event).await
            })
        })
    }

    /// Start terminal: start the container under the phase deadline.
    fn start_handler(&self) -> HandlerFunc<StartEvent> {
        let runtime = Arc::clone(&self.runtime);
        let timeout = self.start_timeout;
        handler_fn(move |event: &mut StartEvent, next| {
            let runtime = Arc::clone(&runtime);
            Box::pin(async move {
                let container = runtime
                    .container
                    .lock()
                    .await
                    .clone()
                    .ok_or(Error::NotBooted)?;
                match tokio::time::timeout(timeout, container.start()).await {
                    Err(_) => return Err(Error::StartTimeout(timeout)),
                    Ok(Err(source)) => return Err(Error::Start(source)),
                    Ok(Ok(())) => {}
                }
                next.run(event).await
            })
        })
    }

    /// Stop terminal: stop the container under the phase deadline. During
    /// a restart a failure here is suppressed so the restart can proceed
    /// (best-effort shutdown).
    fn stop_handler(&self) -> HandlerFunc<StopEvent> {
        let runtime = Arc::clone(&self.runtime);
        let timeout = self.stop_timeout;
        handler_fn(move |event: &mut StopEvent, next| {
            let runtime = Arc::clone(&runtime);
            Box::pin(async move {
                if let Err(err) = stop_container(&runtime, timeout).await {
                    if !event.restarting {
                        return Err(err);
                    }
                    tracing::warn!(error = %err, "stop failed during restart, continuing");
                }
                next.run(event).await
            })
        })
    }

    /// Restart terminal: once the restart is committed, release the owned
    /// references, then replace the process image.
    fn restart_handler(&self) -> HandlerFunc<StopEvent> {
        let runtime = Arc::clone(&self.runtime);
        let replace_process = self.replace_process;
        handler_fn(move |event: &mut StopEvent, next| {
            let runtime = Arc::clone(&runtime);
            Box::pin(async move {
                if !event.restarting {
                    return next.run(event).await;
                }
                runtime.container.lock().await.take();
                *runtime.logger.lock().await = Arc::new(NopLogger);
                Err(Error::Restart(replace_process()))
            })
        })
    }
}

async fn stop_container<C: Container>(runtime: &RuntimeCell<C>, timeout: Duration) -> Result<()> {
    let container = runtime
        .container
        .lock()
        .await
        .clone()
        .ok_or(Error::NotBooted)?;
    match tokio::time::timeout(timeout, container.stop()).await {
        Err(_) => Err(Error::StopTimeout(timeout)),
        Ok(Err(source)) => Err(Error::Stop(source)),
        Ok(Ok(())) => Ok(()),
    }
}

/// Replace the current process image with a fresh invocation of the same
/// executable, arguments and environment. Returns only on failure.
#[cfg(unix)]
fn exec_self() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let exe = match std::env::current_exe() {
        Ok(path) => path,
        Err(err) => return err,
    };
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec()
}

#[cfg(not(unix))]
fn exec_self() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process replacement requires unix",
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::container::Termination;
    use crate::testing::{MockContainer, MockOption, Probe};

    fn test_app() -> App<MockContainer> {
        App::new(AppConfig {
            name: "keel-test".into(),
            version: "0.0.0".into(),
            ..AppConfig::default()
        })
    }

    async fn current_container(app: &App<MockContainer>) -> Option<Arc<MockContainer>> {
        app.runtime.container.lock().await.clone()
    }

    fn push_service(label: &'static str, priority: i32) -> crate::hooks::Handler<BootEvent<MockContainer>> {
        crate::hooks::Handler::new(move |event: &mut BootEvent<MockContainer>, next| {
            event.options.push(MockOption::Service(label));
            Box::pin(async move { next.run(event).await })
        })
        .with_priority(priority)
    }

    #[tokio::test]
    async fn boot_assembles_container_from_accumulated_options() {
        let app = test_app();
        app.on_boot().bind(push_service("metrics", 0)).await;
        app.on_boot().bind(push_service("db", -1)).await;
        app.on_boot().bind(push_service("http", 0)).await;

        app.boot().await.unwrap();

        let container = current_container(&app).await.expect("container installed");
        assert_eq!(container.services, vec!["db", "metrics", "http"]);
    }

    #[tokio::test]
    async fn boot_fails_when_a_handler_clears_the_logger() {
        let app = test_app();
        app.on_boot()
            .bind_func(|event, next| {
                event.logger = None;
                Box::pin(async move { next.run(event).await })
            })
            .await;

        let err = app.boot().await.unwrap_err();
        assert!(matches!(err, Error::MissingLogger));
        assert!(current_container(&app).await.is_none());
    }

    #[tokio::test]
    async fn boot_wraps_container_build_failures() {
        let app = test_app();
        app.on_boot()
            .bind_func(|event, next| {
                event.options.push(MockOption::FailBuild("bad wiring"));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        let err = app.boot().await.unwrap_err();
        assert!(matches!(err, Error::Boot(_)));
        assert!(current_container(&app).await.is_none());
    }

    #[tokio::test]
    async fn start_before_boot_is_rejected() {
        let app = test_app();
        let err = app.start().await.unwrap_err();
        assert!(matches!(err, Error::NotBooted));
    }

    #[tokio::test]
    async fn start_failure_is_wrapped_with_the_phase() {
        let app = test_app();
        app.on_boot()
            .bind_func(|event, next| {
                event.options.push(MockOption::FailStart("port in use"));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        app.boot().await.unwrap();
        let err = app.start().await.unwrap_err();
        assert!(matches!(err, Error::Start(_)));
        assert!(err.to_string().contains("port in use"));
    }

    #[tokio::test]
    async fn start_respects_the_configured_timeout() {
        let app = App::<MockContainer>::new(AppConfig {
            start_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        });
        app.on_boot()
            .bind_func(|event, next| {
                event
                    .options
                    .push(MockOption::SlowStart(Duration::from_secs(5)));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        app.boot().await.unwrap();
        let err = app.start().await.unwrap_err();
        assert!(matches!(err, Error::StartTimeout(_)));
    }

    #[tokio::test]
    async fn stop_respects_the_configured_timeout() {
        let app = App::<MockContainer>::new(AppConfig {
            stop_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        });
        app.on_boot()
            .bind_func(|event, next| {
                event
                    .options
                    .push(MockOption::SlowStop(Duration::from_secs(5)));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        app.boot().await.unwrap();
        let err = app.stop().await.unwrap_err();
        assert!(matches!(err, Error::StopTimeout(_)));
    }

    #[tokio::test]
    async fn stop_failure_is_returned_outside_restart() {
        let app = test_app();
        app.on_boot()
            .bind_func(|event, next| {
                event.options.push(MockOption::FailStop("still draining"));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        app.boot().await.unwrap();
        let err = app.stop().await.unwrap_err();
        assert!(matches!(err, Error::Stop(_)));
    }

    #[tokio::test]
    async fn stop_handler_dropping_the_continuation_skips_the_container_stop() {
        let probe = Arc::new(Probe::default());
        let app = test_app();
        app.on_boot()
            .bind_func({
                let probe = Arc::clone(&probe);
                move |event, next| {
                    event.options.push(MockOption::Probe(Arc::clone(&probe)));
                    Box::pin(async move { next.run(event).await })
                }
            })
            .await;
        app.on_stop()
            .bind_func(|_event, _next| Box::pin(async { Ok(()) }))
            .await;

        app.boot().await.unwrap();
        app.stop().await.unwrap();
        assert!(!probe.stopped.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restart_suppresses_stop_failures_and_commits() {
        static EXEC_CALLED: AtomicBool = AtomicBool::new(false);
        fn fake_exec() -> std::io::Error {
            EXEC_CALLED.store(true, Ordering::SeqCst);
            std::io::Error::other("exec stubbed out")
        }

        let mut app = test_app();
        app.replace_process = fake_exec;
        app.on_boot()
            .bind_func(|event, next| {
                event.options.push(MockOption::FailStop("still draining"));
                Box::pin(async move { next.run(event).await })
            })
            .await;

        app.boot().await.unwrap();
        assert!(current_container(&app).await.is_some());

        // The stop failure is suppressed; the commit point clears the
        // container and the (stubbed) process replacement is attempted.
        let err = app.restart().await.unwrap_err();
        assert!(matches!(err, Error::Restart(_)));
        assert!(EXEC_CALLED.load(Ordering::SeqCst));
        assert!(current_container(&app).await.is_none());
    }

    #[cfg(not(unix))]
    #[tokio::test]
    async fn restart_is_unsupported_and_mutates_nothing() {
        let app = test_app();
        app.boot().await.unwrap();

        let err = app.restart().await.unwrap_err();
        assert!(matches!(err, Error::RestartUnsupported));
        assert!(current_container(&app).await.is_some());
    }

    // Signal tests deliver SIGUSR1 process-wide; every test that enters
    // run() stubs out process replacement so a stray request can never
    // exec over the test binary.
    fn exec_noop() -> std::io::Error {
        std::io::Error::other("exec stubbed out")
    }

    struct RecordingLogger {
        cause: StdMutex<Option<Termination>>,
    }

    impl LifecycleLogger for RecordingLogger {
        fn stopping(&self, cause: &Termination) {
            *self.cause.lock().unwrap() = Some(cause.clone());
        }
    }

    #[tokio::test]
    async fn run_stops_when_the_container_terminates() {
        let probe = Arc::new(Probe::default());
        let notify = Arc::new(Notify::new());
        let logger = Arc::new(RecordingLogger {
            cause: StdMutex::new(None),
        });

        let mut app = test_app();
        app.replace_process = exec_noop;
        app.on_boot()
            .bind_func({
                let probe = Arc::clone(&probe);
                let notify = Arc::clone(&notify);
                let logger = Arc::clone(&logger);
                move |event, next| {
                    event.options.push(MockOption::Probe(Arc::clone(&probe)));
                    event.options.push(MockOption::TerminateOn(
                        Arc::clone(&notify),
                        Termination::Signal(15),
                    ));
                    event.logger = Some(Arc::clone(&logger) as Arc<dyn LifecycleLogger>);
                    Box::pin(async move { next.run(event).await })
                }
            })
            .await;

        let trigger = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            notify.notify_one();
        };
        let (run_result, ()) = tokio::join!(app.run(), trigger);
        run_result.unwrap();

        assert!(probe.started.load(Ordering::SeqCst));
        assert!(probe.stopped.load(Ordering::SeqCst));
        assert_eq!(
            *logger.cause.lock().unwrap(),
            Some(Termination::Signal(15))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_restarts_on_a_restart_request_signal() {
        static EXEC_CALLED: AtomicBool = AtomicBool::new(false);
        fn recording_exec() -> std::io::Error {
            EXEC_CALLED.store(true, Ordering::SeqCst);
            std::io::Error::other("exec stubbed out")
        }

        struct SignalLogger {
            requested: Arc<AtomicBool>,
        }

        impl LifecycleLogger for SignalLogger {
            fn restart_requested(&self) {
                self.requested.store(true, Ordering::SeqCst);
            }
        }

        let requested = Arc::new(AtomicBool::new(false));
        let mut app = test_app();
        app.replace_process = recording_exec;
        app.on_boot()
            .bind_func({
                let requested = Arc::clone(&requested);
                move |event, next| {
                    event.logger = Some(Arc::new(SignalLogger {
                        requested: Arc::clone(&requested),
                    }));
                    Box::pin(async move { next.run(event).await })
                }
            })
            .await;

        // The unscripted mock never terminates on its own, so only the
        // signal can resolve the race.
        let send_signal = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let status = std::process::Command::new("kill")
                .arg("-USR1")
                .arg(std::process::id().to_string())
                .status()
                .unwrap();
            assert!(status.success());
        };
        let (run_result, ()) = tokio::join!(app.run(), send_signal);

        let err = run_result.unwrap_err();
        assert!(matches!(err, Error::Restart(_)));
        assert!(EXEC_CALLED.load(Ordering::SeqCst));
        assert!(requested.load(Ordering::SeqCst));
        assert!(current_container(&app).await.is_none());
    }
}
