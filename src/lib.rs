//! Keel: hook-driven lifecycle orchestration for long-running services.
//!
//! The crate has two halves:
//!
//! - [`hooks`]: a generic interception engine. A [`hooks::Hook`] holds
//!   uniquely identified, priority-ordered handlers for one event type and
//!   dispatches them as a chain of responsibility; each handler decides,
//!   by running or dropping its [`hooks::Next`] continuation, whether the
//!   rest of the chain executes. [`hooks::TaggedHook`] adds tag-filtered
//!   views over a shared hook.
//! - [`app`]: an [`app::App`] built on those hooks that drives a process
//!   through boot, start, stop and in-place restart around a pluggable
//!   runtime [`container::Container`], with layered [`config`] loading and
//!   [`bootstrap`] helpers for wiring options from config.
//!
//! ```ignore
//! let app: App<MyContainer> = App::new(AppConfig {
//!     name: "my-service".into(),
//!     loader: ConfigLoader::new()
//!         .with_file("config.toml")
//!         .with_env_prefix("MYAPP_"),
//!     ..AppConfig::default()
//! });
//! app.on_boot()
//!     .bind(Handler::from_func(bootstrap::boot_config(wire_http)))
//!     .await;
//! app.run().await?;
//! ```

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod container;
pub mod error;
pub mod hooks;
pub mod logger;
pub mod testing;

pub use error::{Error, Result};

/// Commonly used types, for glob import in binaries.
pub mod prelude {
    pub use crate::app::{App, AppConfig, BootEvent, StartEvent, StopEvent};
    pub use crate::config::{ConfigFormat, ConfigLoader, ConfigSection};
    pub use crate::container::{Container, Termination};
    pub use crate::error::{Error, Result};
    pub use crate::hooks::{Handler, HandlerFunc, Hook, Next, Tagged, TaggedHook, handler_fn};
    pub use crate::logger::{LifecycleLogger, NopLogger, TracingLogger};
}
