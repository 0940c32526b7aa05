// ============================================================================
// Registry Factory
// Builder wiring storage, configuration and collaborator sinks
// ============================================================================

use std::sync::Arc;

use crate::domain::config::SwapConfig;
use crate::interfaces::{
    AccountLedger, EventSink, InvariantChecker, NoOpChecker, NoOpEventSink, NoOpLedger,
};
use crate::storage::{MemTree, Tree};

use super::registry::{EngineCtx, PairRegistry};

/// Builder for a [`PairRegistry`].
pub struct PairRegistryBuilder {
    storage: Arc<dyn Tree>,
    config: SwapConfig,
    ledger: Arc<dyn AccountLedger>,
    checker: Arc<dyn InvariantChecker>,
    events: Arc<dyn EventSink>,
}

impl PairRegistryBuilder {
    /// Start from a storage tree with default config and no-op
    /// collaborators.
    pub fn new(storage: Arc<dyn Tree>) -> Self {
        Self {
            storage,
            config: SwapConfig::default(),
            ledger: Arc::new(NoOpLedger),
            checker: Arc::new(NoOpChecker),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Start from a fresh in-memory tree. Convenient for tests and tools.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemTree::new()))
    }

    pub fn with_config(mut self, config: SwapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn AccountLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_checker(mut self, checker: Arc<dyn InvariantChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validate the configuration and build the registry.
    pub fn build(self) -> Result<PairRegistry, String> {
        self.config.validate()?;
        Ok(PairRegistry::from_ctx(EngineCtx::new(
            self.storage,
            self.config,
            self.ledger,
            self.checker,
            self.events,
        )))
    }
}
