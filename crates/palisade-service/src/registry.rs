//! The module registry: name → module, msg id → handler.
//!
//! Registration is one-shot at startup and fails on duplicates, by name
//! or by message id. After startup the registry is immutable and shared
//! read-only across the shard workers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::ServiceModule;
use crate::ServiceError;

#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Arc<dyn ServiceModule>>,
    handlers: HashMap<i32, Arc<dyn ServiceModule>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module and claims its message ids.
    pub fn register(&mut self, module: Arc<dyn ServiceModule>) -> Result<(), ServiceError> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(ServiceError::DuplicateModule(name));
        }

        module.init()?;

        for msg_id in module.msg_ids() {
            if let Some(owner) = self.handlers.get(&msg_id) {
                return Err(ServiceError::DuplicateHandler {
                    msg_id,
                    module: owner.name().to_string(),
                });
            }
        }
        for msg_id in module.msg_ids() {
            self.handlers.insert(msg_id, Arc::clone(&module));
        }
        tracing::info!(module = %name, "module registered");
        self.modules.insert(name, module);
        Ok(())
    }

    pub fn handler_for(&self, msg_id: i32) -> Option<Arc<dyn ServiceModule>> {
        self.handlers.get(&msg_id).cloned()
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn ServiceModule>> {
        self.modules.get(name).cloned()
    }
}
