//! Lifecycle hooks around the verify and settle operations.
//!
//! Hooks let an application intercept the facilitator pipeline at six
//! points: before/after/on-failure for each of verify and settle. A before
//! hook decides with a tagged [`HookOutcome`]; after hooks observe the
//! result (their errors are logged, never propagated); failure hooks may
//! substitute a recovery response.
//!
//! Wrap any [`Facilitator`] in a [`HookedFacilitator`] to activate a
//! [`FacilitatorHooks`] set.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::facilitator::{Facilitator, FacilitatorError, FacilitatorFuture};
use crate::proto;
use crate::proto::FailureReason;

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decision returned by a before-hook.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    /// Proceed with the operation.
    Continue,
    /// Skip the operation and fail with the given reason.
    Abort {
        /// Machine-readable abort reason, surfaced as `invalidReason` /
        /// `errorReason`.
        reason: FailureReason,
        /// Human-readable message for logs.
        message: String,
    },
}

/// Context passed to verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// The raw verify request.
    pub request: proto::VerifyRequest,
}

/// Context passed to after-verify hooks.
#[derive(Debug, Clone)]
pub struct VerifyResultContext {
    /// The original verify context.
    pub ctx: VerifyContext,
    /// The verification result.
    pub response: proto::VerifyResponse,
}

/// Context passed to verify-failure hooks.
#[derive(Debug, Clone)]
pub struct VerifyFailureContext {
    /// The original verify context.
    pub ctx: VerifyContext,
    /// Description of the error.
    pub error: String,
}

/// Context passed to settle hooks.
#[derive(Debug, Clone)]
pub struct SettleContext {
    /// The raw settle request.
    pub request: proto::SettleRequest,
}

/// Context passed to after-settle hooks.
#[derive(Debug, Clone)]
pub struct SettleResultContext {
    /// The original settle context.
    pub ctx: SettleContext,
    /// The settlement result.
    pub response: proto::SettleResponse,
}

/// Context passed to settle-failure hooks.
#[derive(Debug, Clone)]
pub struct SettleFailureContext {
    /// The original settle context.
    pub ctx: SettleContext,
    /// Description of the error.
    pub error: String,
}

type BeforeVerifyHook = dyn Fn(VerifyContext) -> BoxFut<'static, HookOutcome> + Send + Sync;
type AfterVerifyHook =
    dyn Fn(VerifyResultContext) -> BoxFut<'static, Result<(), String>> + Send + Sync;
type VerifyFailureHook =
    dyn Fn(VerifyFailureContext) -> BoxFut<'static, Option<proto::VerifyResponse>> + Send + Sync;
type BeforeSettleHook = dyn Fn(SettleContext) -> BoxFut<'static, HookOutcome> + Send + Sync;
type AfterSettleHook =
    dyn Fn(SettleResultContext) -> BoxFut<'static, Result<(), String>> + Send + Sync;
type SettleFailureHook =
    dyn Fn(SettleFailureContext) -> BoxFut<'static, Option<proto::SettleResponse>> + Send + Sync;

/// Collection of lifecycle hooks.
///
/// All hooks are optional; multiple hooks at the same point run in
/// registration order.
#[derive(Clone, Default)]
pub struct FacilitatorHooks {
    before_verify: Vec<Arc<BeforeVerifyHook>>,
    after_verify: Vec<Arc<AfterVerifyHook>>,
    on_verify_failure: Vec<Arc<VerifyFailureHook>>,
    before_settle: Vec<Arc<BeforeSettleHook>>,
    after_settle: Vec<Arc<AfterSettleHook>>,
    on_settle_failure: Vec<Arc<SettleFailureHook>>,
}

impl std::fmt::Debug for FacilitatorHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorHooks")
            .field("before_verify", &self.before_verify.len())
            .field("after_verify", &self.after_verify.len())
            .field("on_verify_failure", &self.on_verify_failure.len())
            .field("before_settle", &self.before_settle.len())
            .field("after_settle", &self.after_settle.len())
            .field("on_settle_failure", &self.on_settle_failure.len())
            .finish()
    }
}

impl FacilitatorHooks {
    /// Registers a hook to run before payment verification.
    #[must_use]
    pub fn on_before_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookOutcome> + Send + 'static,
    {
        self.before_verify
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to run after successful verification.
    #[must_use]
    pub fn on_after_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyResultContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_verify
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to run when verification errors.
    #[must_use]
    pub fn on_verify_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<proto::VerifyResponse>> + Send + 'static,
    {
        self.on_verify_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to run before payment settlement.
    #[must_use]
    pub fn on_before_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookOutcome> + Send + 'static,
    {
        self.before_settle
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to run after successful settlement.
    #[must_use]
    pub fn on_after_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleResultContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_settle
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to run when settlement errors.
    #[must_use]
    pub fn on_settle_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<proto::SettleResponse>> + Send + 'static,
    {
        self.on_settle_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }
}

/// A [`Facilitator`] decorator that runs [`FacilitatorHooks`] around an
/// inner facilitator's operations.
pub struct HookedFacilitator {
    inner: Box<dyn Facilitator>,
    hooks: Arc<FacilitatorHooks>,
}

impl std::fmt::Debug for HookedFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedFacilitator")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl HookedFacilitator {
    /// Wraps an inner facilitator with the given hooks.
    #[must_use]
    pub fn new(inner: Box<dyn Facilitator>, hooks: FacilitatorHooks) -> Self {
        Self {
            inner,
            hooks: Arc::new(hooks),
        }
    }
}

impl Facilitator for HookedFacilitator {
    fn verify(&self, request: proto::VerifyRequest) -> FacilitatorFuture<'_, proto::VerifyResponse> {
        let hooks = Arc::clone(&self.hooks);
        let hook_ctx = VerifyContext {
            request: request.clone(),
        };
        Box::pin(async move {
            for hook in &hooks.before_verify {
                if let HookOutcome::Abort { reason, message } = hook(hook_ctx.clone()).await {
                    return Err(FacilitatorError::Aborted { reason, message });
                }
            }

            match self.inner.verify(request).await {
                Ok(response) => {
                    let result_ctx = VerifyResultContext {
                        ctx: hook_ctx,
                        response: response.clone(),
                    };
                    for hook in &hooks.after_verify {
                        let _ = hook(result_ctx.clone()).await;
                    }
                    Ok(response)
                }
                Err(err) => {
                    let failure_ctx = VerifyFailureContext {
                        ctx: hook_ctx,
                        error: err.to_string(),
                    };
                    for hook in &hooks.on_verify_failure {
                        if let Some(recovered) = hook(failure_ctx.clone()).await {
                            return Ok(recovered);
                        }
                    }
                    Err(err)
                }
            }
        })
    }

    fn settle(&self, request: proto::SettleRequest) -> FacilitatorFuture<'_, proto::SettleResponse> {
        let hooks = Arc::clone(&self.hooks);
        let hook_ctx = SettleContext {
            request: request.clone(),
        };
        Box::pin(async move {
            for hook in &hooks.before_settle {
                if let HookOutcome::Abort { reason, message } = hook(hook_ctx.clone()).await {
                    return Err(FacilitatorError::Aborted { reason, message });
                }
            }

            match self.inner.settle(request).await {
                Ok(response) => {
                    let result_ctx = SettleResultContext {
                        ctx: hook_ctx,
                        response: response.clone(),
                    };
                    for hook in &hooks.after_settle {
                        let _ = hook(result_ctx.clone()).await;
                    }
                    Ok(response)
                }
                Err(err) => {
                    let failure_ctx = SettleFailureContext {
                        ctx: hook_ctx,
                        error: err.to_string(),
                    };
                    for hook in &hooks.on_settle_failure {
                        if let Some(recovered) = hook(failure_ctx.clone()).await {
                            return Ok(recovered);
                        }
                    }
                    Err(err)
                }
            }
        })
    }

    fn supported(&self) -> FacilitatorFuture<'_, proto::SupportedResponse> {
        self.inner.supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFacilitator;

    impl Facilitator for StubFacilitator {
        fn verify(
            &self,
            _request: proto::VerifyRequest,
        ) -> FacilitatorFuture<'_, proto::VerifyResponse> {
            Box::pin(async { Ok(proto::VerifyResponse::valid("0xpayer".into())) })
        }

        fn settle(
            &self,
            _request: proto::SettleRequest,
        ) -> FacilitatorFuture<'_, proto::SettleResponse> {
            Box::pin(async {
                Ok(proto::SettleResponse::Success {
                    payer: "0xpayer".into(),
                    transaction: "0xtx".into(),
                    network: ChainId::eip155(84532),
                })
            })
        }

        fn supported(&self) -> FacilitatorFuture<'_, proto::SupportedResponse> {
            Box::pin(async { Ok(proto::SupportedResponse::default()) })
        }
    }

    fn request() -> proto::VerifyRequest {
        proto::VerifyRequest::from(serde_json::json!({}))
    }

    #[tokio::test]
    async fn before_hook_abort_short_circuits() {
        let hooks = FacilitatorHooks::default().on_before_verify(|_ctx| async {
            HookOutcome::Abort {
                reason: FailureReason::UnsupportedChainPair,
                message: "no bridge route".into(),
            }
        });
        let hooked = HookedFacilitator::new(Box::new(StubFacilitator), hooks);
        let err = hooked.verify(request()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::UnsupportedChainPair);
    }

    #[tokio::test]
    async fn after_hooks_observe_but_cannot_fail_the_operation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = FacilitatorHooks::default().on_after_verify(move |ctx| {
            let seen = Arc::clone(&seen);
            async move {
                assert!(ctx.response.is_valid());
                seen.fetch_add(1, Ordering::SeqCst);
                Err("hook failure is swallowed".into())
            }
        });
        let hooked = HookedFacilitator::new(Box::new(StubFacilitator), hooks);
        let response = hooked.verify(request()).await.unwrap();
        assert!(response.is_valid());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let hooks = FacilitatorHooks::default()
            .on_before_verify(move |_| {
                let order = Arc::clone(&first);
                async move {
                    order.lock().unwrap().push(1);
                    HookOutcome::Continue
                }
            })
            .on_before_verify(move |_| {
                let order = Arc::clone(&second);
                async move {
                    order.lock().unwrap().push(2);
                    HookOutcome::Continue
                }
            });
        let hooked = HookedFacilitator::new(Box::new(StubFacilitator), hooks);
        hooked.verify(request()).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
