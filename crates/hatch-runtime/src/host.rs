//! Hosting execution context
//!
//! The host is where resources end up: it applies stylesheets and executes
//! scripts for the content runtime. [`RecordingHost`] and
//! [`RecordingRuntime`] are in-process stand-ins that only record what they
//! were given, used by the CLI and by tests.

use crate::loader::{Asset, AssetKind};
use crate::pipeline::{ContentRuntime, RuntimeInit};
use crate::store::ResourceHandle;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Failure reported by the host or the content runtime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Execution context that receives the ordered resources
pub trait HostContext: Send + Sync + 'static {
    /// Apply a stylesheet; it counts as loaded as soon as this returns
    fn inject_style(&self, asset: &Asset) -> Result<(), HostError>;

    /// Execute a script; resolves once the host signals load or error
    fn inject_script(&self, asset: Asset) -> impl Future<Output = Result<(), HostError>> + Send;
}

/// One resource handed to a [`RecordingHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub kind: AssetKind,
    pub package: String,
    pub path: String,
    pub handle: ResourceHandle,
}

impl From<&Asset> for Injection {
    fn from(asset: &Asset) -> Self {
        Self {
            kind: asset.kind,
            package: asset.package.clone(),
            path: asset.path.clone(),
            handle: asset.handle.clone(),
        }
    }
}

/// Host that records injections in completion order
#[derive(Debug, Default)]
pub struct RecordingHost {
    injections: Mutex<Vec<Injection>>,
    failing: HashSet<String>,
    script_delay: Option<Duration>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a script (`package/path`) report an error instead of loading
    pub fn with_failing_script(mut self, package: &str, path: &str) -> Self {
        self.failing.insert(format!("{}/{}", package, path));
        self
    }

    /// Take this long to "execute" every script
    pub fn with_script_delay(mut self, delay: Duration) -> Self {
        self.script_delay = Some(delay);
        self
    }

    /// Recorded injections, in order
    pub fn injections(&self) -> Vec<Injection> {
        self.injections.lock().clone()
    }

    /// Recorded injections of one kind, as `package/path`
    pub fn injected(&self, kind: AssetKind) -> Vec<String> {
        self.injections
            .lock()
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| format!("{}/{}", i.package, i.path))
            .collect()
    }
}

impl HostContext for RecordingHost {
    fn inject_style(&self, asset: &Asset) -> Result<(), HostError> {
        self.injections.lock().push(Injection::from(asset));
        Ok(())
    }

    fn inject_script(&self, asset: Asset) -> impl Future<Output = Result<(), HostError>> + Send {
        let key = format!("{}/{}", asset.package, asset.path);
        let fails = self.failing.contains(&key);
        let delay = self.script_delay;

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fails {
                return Err(HostError(format!("script error in {}", key)));
            }
            self.injections.lock().push(Injection::from(&asset));
            Ok(())
        }
    }
}

/// Content runtime that keeps the init signal it received
#[derive(Default)]
pub struct RecordingRuntime {
    init: Mutex<Option<RuntimeInit>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.init.lock().is_some()
    }

    /// Take the init signal, if one arrived
    pub fn take_init(&self) -> Option<RuntimeInit> {
        self.init.lock().take()
    }
}

impl ContentRuntime for RecordingRuntime {
    fn initialize(&self, init: RuntimeInit) -> Result<(), HostError> {
        *self.init.lock() = Some(init);
        Ok(())
    }
}

impl std::fmt::Debug for RecordingRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRuntime")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
