use super::{
    artifacts::SaveArtifactsRunner, echo::EchoRunner, passthrough::PassthroughRunner, TaskHandler,
};
use anyhow::Result;
use momentum_base::error::MomentumError;
use momentum_infra::container::DataContainerFactory;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Name to handler table consulted by the executor.
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn TaskHandler>>>,
}

impl std::fmt::Debug for TaskHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers. `containers` is where
    /// `SaveArtifactsV1` writes its snapshot.
    pub fn new_with_builtins(containers: DataContainerFactory) -> Result<Self> {
        let registry = Self::new();
        registry.register(Arc::new(PassthroughRunner))?;
        registry.register(Arc::new(EchoRunner))?;
        registry.register(Arc::new(SaveArtifactsRunner::new(containers)))?;
        Ok(registry)
    }

    pub fn register(&self, handler: Arc<dyn TaskHandler>) -> Result<()> {
        let name = handler.name();
        let mut handlers = self
            .handlers
            .write()
            .map_err(|e| MomentumError::RuntimeError(format!("registry lock poisoned: {:?}", e)))?;
        if handlers.contains_key(&name) {
            tracing::debug!("task handler {} already registered", &name);
            return Err(MomentumError::InvalidParameter(format!(
                "task handler {name} already registered."
            ))
            .into());
        }
        tracing::debug!("register task handler: {}", &name);
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(name).cloned())
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default()
    }
}
