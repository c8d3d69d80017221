//! Scheme handler registry.
//!
//! Maps `(scheme, network)` pairs to facilitator handlers. The table is
//! built once at boot; there is no runtime registration.

use std::collections::HashMap;
use std::sync::Arc;

use b402::proto::{DispatchKey, SupportedResponse};
use b402::Facilitator;

/// Registry of scheme handlers keyed by `(scheme, network)`.
#[derive(Default)]
pub struct SchemeRegistry(HashMap<DispatchKey, Arc<dyn Facilitator>>);

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .0
            .keys()
            .map(|k| format!("{}:{}", k.scheme, k.network))
            .collect();
        f.debug_tuple("SchemeRegistry").field(&keys).finish()
    }
}

impl SchemeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a `(scheme, network)` pair.
    pub fn register(&mut self, key: DispatchKey, handler: Arc<dyn Facilitator>) {
        self.0.insert(key, handler);
    }

    /// Looks up the handler for a dispatch key.
    #[must_use]
    pub fn by_key(&self, key: &DispatchKey) -> Option<&Arc<dyn Facilitator>> {
        self.0.get(key)
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges the supported-response of every registered handler.
    pub async fn supported(&self) -> SupportedResponse {
        let mut merged = SupportedResponse::default();
        for handler in self.0.values() {
            if let Ok(supported) = handler.supported().await {
                merged.kinds.extend(supported.kinds);
                for extension in supported.extensions {
                    if !merged.extensions.contains(&extension) {
                        merged.extensions.push(extension);
                    }
                }
                for (family, addresses) in supported.signers {
                    merged.signers.entry(family).or_insert(addresses);
                }
            }
        }
        merged.kinds.sort_by(|a, b| {
            (a.network.as_str(), a.scheme.as_str()).cmp(&(b.network.as_str(), b.scheme.as_str()))
        });
        merged
    }
}
