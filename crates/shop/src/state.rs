//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::payment::PaymentMethods;
use crate::services::FulfilmentEngine;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: FulfilmentEngine,
    payment_methods: PaymentMethods,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: FulfilmentEngine, payment_methods: PaymentMethods) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                payment_methods,
            }),
        }
    }

    /// The fulfilment engine.
    #[must_use]
    pub fn engine(&self) -> &FulfilmentEngine {
        &self.inner.engine
    }

    /// The configured payment methods.
    #[must_use]
    pub fn payment_methods(&self) -> &PaymentMethods {
        &self.inner.payment_methods
    }

    /// The purchase and stock store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        self.inner.engine.store()
    }
}
