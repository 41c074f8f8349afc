//! Hatch Runtime
//!
//! Turns a resolved content archive into addressable in-memory resources
//! and feeds them, in dependency order, to a hosting execution context:
//! - Virtual asset store with content-addressed handles
//! - Stylesheet `url(...)` rewriting
//! - Tiered style and script loading
//! - Override adapter and event filtering for the content runtime

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod host;
pub mod loader;
pub mod mime;
pub mod overrides;
pub mod pipeline;
pub mod store;
pub mod stylesheet;

pub use config::{ConfigError, HatchConfig};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::RuntimeError;
pub use events::{
    Debouncer, EventDispatcher, EventPolicy, EventSink, Expiry, Offer, RecordingSink, XapiEvent,
};
pub use host::{HostContext, HostError, Injection, RecordingHost, RecordingRuntime};
pub use loader::{Asset, AssetKind, LoadPlan, LoadTier, OrderedLoader};
pub use mime::mime_for_path;
pub use overrides::{
    ArchiveOverrides, ContentType, MemoryUserData, RuntimeOverrides, UserDataKey, UserDataStore,
};
pub use pipeline::{ContentRuntime, LoadReport, Pipeline, Prepared, RuntimeInit};
pub use store::{AssetStore, Blob, ContentMap, PackageResources, Resource, ResourceHandle};
pub use stylesheet::{resolve_reference, rewrite_stylesheet, Reference, Rewrite};
