//! Scripted summary provider for deterministic testing.
//!
//! Returns queued results in order, then falls back to a default response.
//! Tracks every call, the number of calls in flight and the peak concurrency
//! observed, and can hold calls behind a semaphore gate so tests control
//! exactly when a provider call finishes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use distill_inference::mock::ScriptedProvider;
//! use distill_inference::{ProviderError, SummaryOptions, SummaryProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = ScriptedProvider::new()
//!         .then_fail(ProviderError::rate_limited("slow down"))
//!         .then_return("Summary");
//!
//!     let options = SummaryOptions::default();
//!     assert!(provider.generate_summary("text", &options).await.is_err());
//!     assert_eq!(provider.generate_summary("text", &options).await.unwrap(), "Summary");
//!     assert_eq!(provider.call_count(), 2);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use distill_core::{ConnectionTest, ProviderError, SummaryOptions, SummaryProvider, ValidationResult};

type Scripted = std::result::Result<String, ProviderError>;

#[derive(Debug, Clone)]
struct ScriptConfig {
    provider_id: String,
    model: String,
    default_response: String,
    latency: Duration,
    max_input_length: usize,
    validation: ValidationResult,
    gate: Option<Arc<Semaphore>>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            provider_id: "mock".to_string(),
            model: "mock-model".to_string(),
            default_response: "Mock summary".to_string(),
            latency: Duration::ZERO,
            max_input_length: 100_000,
            validation: ValidationResult::ok(),
            gate: None,
        }
    }
}

#[derive(Default)]
struct ScriptState {
    script: Mutex<VecDeque<Scripted>>,
    inputs: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Mock [`SummaryProvider`] driven by a script of results.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    config: Arc<ScriptConfig>,
    state: Arc<ScriptState>,
}

/// Decrements the in-flight counter even if the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    /// Create a provider that always answers with the default response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful result.
    pub fn then_return(self, summary: impl Into<String>) -> Self {
        self.state.script.lock().unwrap().push_back(Ok(summary.into()));
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.state.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue the same failure `times` times.
    pub fn then_fail_times(self, error: ProviderError, times: usize) -> Self {
        {
            let mut script = self.state.script.lock().unwrap();
            for _ in 0..times {
                script.push_back(Err(error.clone()));
            }
        }
        self
    }

    /// Response used once the script is exhausted.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Hold every call until a permit is added to `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        Arc::make_mut(&mut self.config).gate = Some(gate);
        self
    }

    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).provider_id = id.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    pub fn with_max_input_length(mut self, max: usize) -> Self {
        Arc::make_mut(&mut self.config).max_input_length = max;
        self
    }

    /// Result returned by `validate_configuration`.
    pub fn with_validation(mut self, validation: ValidationResult) -> Self {
        Arc::make_mut(&mut self.config).validation = validation;
        self
    }

    /// Number of `generate_summary` calls started.
    pub fn call_count(&self) -> usize {
        self.state.inputs.lock().unwrap().len()
    }

    /// Texts passed to `generate_summary`, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.state.inputs.lock().unwrap().clone()
    }

    /// Calls currently between start and return.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    /// Scripted results not yet consumed.
    pub fn remaining_script(&self) -> usize {
        self.state.script.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryProvider for ScriptedProvider {
    async fn generate_summary(
        &self,
        text: &str,
        _options: &SummaryOptions,
    ) -> std::result::Result<String, ProviderError> {
        self.state.inputs.lock().unwrap().push(text.to_string());
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.state.in_flight);

        if let Some(gate) = &self.config.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let next = self.state.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.config.default_response.clone()))
    }

    async fn validate_configuration(&self) -> ValidationResult {
        self.config.validation.clone()
    }

    async fn test_connection(&self) -> ConnectionTest {
        ConnectionTest {
            success: self.config.validation.valid,
            latency_ms: self.config.latency.as_millis() as u64,
            response: self
                .config
                .validation
                .valid
                .then(|| self.config.default_response.clone()),
            error: self.config.validation.error.clone(),
        }
    }

    fn max_input_length(&self) -> usize {
        self.config.max_input_length
    }

    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
