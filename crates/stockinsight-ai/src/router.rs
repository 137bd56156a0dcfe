//! Two-provider failover with per-provider circuit breakers.
//!
//! A call makes at most two provider attempts: the preferred provider, then
//! the other one once. A provider whose circuit is open is skipped for the
//! cool-down period instead of being attempted.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use stockinsight_core::{CircuitBreaker, CircuitBreakerConfig, LlmVendor};

use crate::error::{LlmError, LlmErrorKind};
use crate::providers::LlmProvider;

/// Successful completion and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub vendor: LlmVendor,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: &'static str,
    pub model: String,
    pub configured: bool,
    pub circuit: &'static str,
}

struct RoutedProvider {
    provider: Arc<dyn LlmProvider>,
    breaker: CircuitBreaker,
}

pub struct LlmRouter {
    primary: LlmVendor,
    providers: Vec<RoutedProvider>,
}

impl LlmRouter {
    /// `providers` may contain unconfigured entries; they are reported in
    /// [`LlmRouter::status`] but never called.
    pub fn new(
        primary: LlmVendor,
        providers: Vec<Arc<dyn LlmProvider>>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            primary,
            providers: providers
                .into_iter()
                .map(|provider| RoutedProvider {
                    provider,
                    breaker: CircuitBreaker::new(breaker),
                })
                .collect(),
        }
    }

    pub const fn primary(&self) -> LlmVendor {
        self.primary
    }

    pub fn has_configured_provider(&self) -> bool {
        self.providers
            .iter()
            .any(|routed| routed.provider.is_configured())
    }

    /// Configured providers, configured primary first.
    fn candidates(&self) -> Vec<&RoutedProvider> {
        let mut candidates: Vec<&RoutedProvider> = self
            .providers
            .iter()
            .filter(|routed| routed.provider.is_configured())
            .collect();
        candidates.sort_by_key(|routed| routed.provider.vendor() != self.primary);
        candidates.truncate(2);
        candidates
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(LlmError::new(
                self.primary,
                LlmErrorKind::NotConfigured,
                "no LLM provider has an API key",
            ));
        }

        let mut allowed: Vec<&RoutedProvider> = candidates
            .iter()
            .copied()
            .filter(|routed| {
                let allow = routed.breaker.allow_request();
                if !allow {
                    warn!(
                        "{} circuit is open, skipping it",
                        routed.provider.vendor().as_str()
                    );
                }
                allow
            })
            .collect();
        if allowed.is_empty() {
            // Every circuit is open: probe the preferred provider rather than fail blind.
            allowed.push(candidates[0]);
        }

        let mut last_error = None;
        for (attempt, routed) in allowed.into_iter().enumerate() {
            let vendor = routed.provider.vendor();
            if attempt > 0 {
                info!("failing over to {}", vendor.as_str());
            }

            match routed.provider.complete(system, user).await {
                Ok(text) => {
                    routed.breaker.record_success();
                    return Ok(Completion {
                        text,
                        vendor,
                        model: routed.provider.model().to_owned(),
                    });
                }
                Err(error) => {
                    routed.breaker.record_failure();
                    warn!("{} call failed: {error}", vendor.as_str());
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LlmError::new(self.primary, LlmErrorKind::NotConfigured, "no provider attempted")
        }))
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|routed| ProviderStatus {
                provider: routed.provider.vendor().as_str(),
                model: routed.provider.model().to_owned(),
                configured: routed.provider.is_configured(),
                circuit: routed.breaker.state().as_str(),
            })
            .collect()
    }
}
