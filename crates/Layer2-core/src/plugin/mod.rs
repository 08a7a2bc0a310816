//! # Plugin System
//!
//! 플러그인 수명주기와 역할 기반 조회
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PluginRegistry                         │
//! │                                                             │
//! │  Sources                     Plugins (load order)           │
//! │  ├─ builtin PluginFactory    ├─ logging_middleware  [mw]    │
//! │  ├─ plugin paths ──▶ PluginCatalog                          │
//! │  │   (*.json / *.toml)       ├─ history_operations  [op]    │
//! │  └─ PluginModule             └─ neo4j_backend       [be]    │
//! │                                                             │
//! │  discover_and_load → start_all → stop_all → unload_all      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct HistoryPlugin;
//!
//! #[async_trait]
//! impl Plugin for HistoryPlugin {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("history_operations", "1.0.0")
//!     }
//!
//!     fn as_operation_provider(&self) -> Option<&dyn OperationProvider> {
//!         Some(self)
//!     }
//! }
//!
//! let registry = PluginRegistry::new();
//! registry.add_builtin_plugin(PluginFactory::new("history_operations", |_| {
//!     Ok(Arc::new(HistoryPlugin) as Arc<dyn Plugin>)
//! }));
//! registry.discover_and_load().await?;
//! registry.start_all().await;
//! ```

mod metadata;
mod registry;
mod source;
mod traits;

pub use metadata::{PluginInfo, PluginKind, PluginMetadata, PluginState};
pub use registry::PluginRegistry;
pub use source::{
    scan_manifests, DiscoveredManifest, PluginCatalog, PluginFactory, PluginManifest, PluginModule,
};
pub use traits::{
    BackendProvider, Extension, ExtensionContext, Middleware, OperationProvider, Plugin,
    ToolProvider,
};
