//! Ordered backend fallback chain.
//!
//! The chain tries each configured backend in order (default first,
//! de-duplicated by name) and returns the first success. Backends are
//! constructed lazily, only when their turn is reached, so a fallback entry
//! whose credential is missing costs nothing unless every earlier backend
//! already failed. When all backends fail, the *last* observed failure is
//! surfaced; it is the freshest diagnostic.

use crate::backend::{Backend, ChatRequest, ChatResponse, MockBackend, OpenRouterBackend};
use crate::config::FileConfig;
use crate::error::CognateError;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct BackendChain {
    /// Backend names in fallback order.
    names: Vec<String>,
    /// Lazily-initialized backend instances, index-aligned with `names`.
    instances: Mutex<Vec<Option<Arc<Backend>>>>,
    config: FileConfig,
}

impl BackendChain {
    /// Build the chain from config: default backend first, then fallbacks,
    /// de-duplicated by name. `use_mock` replaces the whole chain with the
    /// deterministic mock backend.
    pub fn new(config: FileConfig) -> Self {
        let names = if config.use_mock {
            vec!["mock".to_string()]
        } else {
            let mut names = vec![config.backend.default.clone()];
            for name in &config.backend.fallback {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            names
        };

        Self {
            names,
            instances: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Backend names in fallback order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Test-only constructor with pre-built backends.
    #[cfg(test)]
    pub(crate) fn with_backends(backends: Vec<(String, Backend)>) -> Self {
        let names: Vec<String> = backends.iter().map(|(n, _)| n.clone()).collect();
        let instances = backends
            .into_iter()
            .map(|(_, b)| Some(Arc::new(b)))
            .collect();
        Self {
            names,
            instances: Mutex::new(instances),
            config: FileConfig::default(),
        }
    }

    /// Split a model string into `(backend_name, model)`.
    ///
    /// `openrouter/gpt-4o` targets the named backend; a bare string (or a
    /// vendor-qualified model whose prefix is not a chain member, like
    /// `qwen/qwen3-coder`) applies to the default backend unsplit.
    pub fn parse_model(&self, model_str: &str) -> (String, String) {
        if let Some((backend, model)) = model_str.split_once('/') {
            if self.names.iter().any(|n| n == backend) {
                return (backend.to_string(), model.to_string());
            }
        }
        (
            self.names.first().cloned().unwrap_or_default(),
            model_str.to_string(),
        )
    }

    /// Model field for a specific backend's attempt.
    fn model_for(&self, backend_name: &str, requested: Option<&str>) -> Option<String> {
        let requested = requested?;
        let (target, model) = self.parse_model(requested);
        if target == backend_name {
            Some(model)
        } else {
            // The qualifier names a different chain member; let this backend
            // fall back to its own model resolution.
            None
        }
    }

    fn init_backend(&self, name: &str) -> Result<Backend, CognateError> {
        match name {
            "openrouter" => {
                let settings = self.config.backends.get("openrouter");
                let api_key = settings
                    .and_then(|s| s.api_key.clone())
                    .or_else(|| {
                        settings
                            .and_then(|s| s.api_key_env.as_ref())
                            .and_then(|var| std::env::var(var).ok())
                    })
                    .or_else(OpenRouterBackend::api_key_from_env)
                    .ok_or_else(|| {
                        CognateError::NoAvailableBackend(
                            "openrouter API key not found (set OPENROUTER_API_KEY)".to_string(),
                        )
                    })?;
                let model = settings.and_then(|s| s.model.clone());
                Ok(Backend::OpenRouter(OpenRouterBackend::new(api_key, model)))
            }
            "mock" => Ok(Backend::Mock(MockBackend::new())),
            other => Err(CognateError::NoAvailableBackend(format!(
                "unknown backend: {other}"
            ))),
        }
    }

    /// Get or lazily initialize the backend at `index`.
    fn backend_at(&self, index: usize) -> Result<Arc<Backend>, CognateError> {
        let mut instances = self.instances.lock().unwrap();

        if let Some(Some(backend)) = instances.get(index) {
            return Ok(backend.clone());
        }

        let name = self
            .names
            .get(index)
            .ok_or_else(|| CognateError::NoAvailableBackend("backend index out of bounds".into()))?;
        let backend = Arc::new(self.init_backend(name)?);

        if instances.len() <= index {
            instances.resize(index + 1, None);
        }
        instances[index] = Some(backend.clone());
        Ok(backend)
    }

    /// Try each backend in order; first success wins, last failure surfaces.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, CognateError> {
        let mut last_error: Option<CognateError> = None;

        for (index, name) in self.names.iter().enumerate() {
            let backend = match self.backend_at(index) {
                Ok(b) => b,
                Err(e) => {
                    debug!(backend = %name, error = %e, "backend construction failed, skipping");
                    last_error = Some(e);
                    continue;
                }
            };

            if !backend.is_available() {
                debug!(backend = %name, "backend unavailable, skipping");
                last_error = Some(CognateError::NoAvailableBackend(format!(
                    "backend {name} is not available"
                )));
                continue;
            }

            let mut attempt = request.clone();
            attempt.model = self.model_for(name, request.model.as_deref());

            match backend.complete(attempt).await {
                Ok(response) => {
                    debug!(backend = %name, "backend succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_backend_failure() => {
                    warn!(backend = %name, error = %e, "backend failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| CognateError::NoAvailableBackend("no backends configured".into())))
    }
}

impl std::fmt::Debug for BackendChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChain")
            .field("names", &self.names)
            .field(
                "instances",
                &format!("<{} cached>", self.instances.lock().unwrap().len()),
            )
            .finish()
    }
}
