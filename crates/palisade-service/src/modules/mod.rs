//! The module roster compiled into this Service build.

mod chat;
mod login;

pub use chat::ChatModule;
pub use login::LoginModule;

use std::sync::Arc;

use palisade_store::PlayerStore;

use crate::registry::Registry;
use crate::ServiceError;

/// Builds the registry with the standard modules. Duplicate registration
/// is startup-fatal; the error propagates to the binary's exit code.
pub fn default_registry(store: Arc<dyn PlayerStore>) -> Result<Registry, ServiceError> {
    let mut registry = Registry::new();
    registry.register(Arc::new(LoginModule::new(store)))?;
    registry.register(Arc::new(ChatModule))?;
    Ok(registry)
}
