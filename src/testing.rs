//! Test doubles for the lifecycle orchestrator.
//!
//! [`MockContainer`] is a scriptable [`Container`]: boot handlers push
//! [`MockOption`] values to shape how it builds, starts, stops and
//! terminates, and a shared [`Probe`] exposes the observed side effects.

use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::container::{Container, Termination};

/// Observable side effects of a [`MockContainer`].
#[derive(Default)]
pub struct Probe {
    pub started: AtomicBool,
    pub stopped: AtomicBool,
}

/// Options accumulated on the boot event to script a [`MockContainer`].
#[derive(Clone)]
pub enum MockOption {
    /// A labelled no-op service, recorded in assembly order.
    Service(&'static str),
    /// Record start/stop effects on the shared probe.
    Probe(Arc<Probe>),
    /// Fail assembly with the given message.
    FailBuild(&'static str),
    /// Fail `start` with the given message.
    FailStart(&'static str),
    /// Delay `start` long enough to trip a phase deadline.
    SlowStart(Duration),
    /// Fail `stop` with the given message.
    FailStop(&'static str),
    /// Delay `stop` long enough to trip a phase deadline.
    SlowStop(Duration),
    /// Resolve `wait` with the given cause once notified.
    TerminateOn(Arc<Notify>, Termination),
}

/// Scriptable container; unscripted behaviors succeed (and `wait` pends
/// forever).
#[derive(Default)]
pub struct MockContainer {
    pub services: Vec<&'static str>,
    probe: Option<Arc<Probe>>,
    fail_start: Option<&'static str>,
    slow_start: Option<Duration>,
    fail_stop: Option<&'static str>,
    slow_stop: Option<Duration>,
    termination: Option<(Arc<Notify>, Termination)>,
}

#[async_trait]
impl Container for MockContainer {
    type Option = MockOption;

    fn build(options: Vec<MockOption>) -> anyhow::Result<Self> {
        let mut container = MockContainer::default();
        for option in options {
            match option {
                MockOption::Service(label) => container.services.push(label),
                MockOption::Probe(probe) => container.probe = Some(probe),
                MockOption::FailBuild(msg) => anyhow::bail!(msg),
                MockOption::FailStart(msg) => container.fail_start = Some(msg),
                MockOption::SlowStart(delay) => container.slow_start = Some(delay),
                MockOption::FailStop(msg) => container.fail_stop = Some(msg),
                MockOption::SlowStop(delay) => container.slow_stop = Some(delay),
                MockOption::TerminateOn(notify, cause) => {
                    container.termination = Some((notify, cause));
                }
            }
        }
        Ok(container)
    }

    async fn start(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.slow_start {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.fail_start {
            anyhow::bail!(msg);
        }
        if let Some(probe) = &self.probe {
            probe.started.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.slow_stop {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.fail_stop {
            anyhow::bail!(msg);
        }
        if let Some(probe) = &self.probe {
            probe.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait(&self) -> Termination {
        match &self.termination {
            Some((notify, cause)) => {
                notify.notified().await;
                cause.clone()
            }
            None => pending().await,
        }
    }
}
