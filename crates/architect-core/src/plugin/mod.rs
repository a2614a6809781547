//! The plugin loader: resolves plugin artifacts from multiple source
//! types (`source`), loads the service-declared implementations inside
//! each artifact (`abi`, `loader`), and hydrates each plugin's typed
//! configuration from the project's declarative configuration document
//! (`manifest`).
pub mod abi;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod source;

pub use error::PluginError;
pub use loader::PluginLoader;
pub use manifest::PluginDescriptor;

/// The identity a loaded plugin reports through its vtable: `{id,
/// context_key}`. Held only long enough to label the tasks it
/// registers and to report a `TASK_ID_COLLISION` naming both plugins;
/// the loaded artifact itself is kept alive for the project's lifetime
/// by an `Arc` captured inside every task handler it contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub id: String,
    pub context_key: String,
}
