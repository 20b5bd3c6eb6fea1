use std::sync::Arc;

use arc_swap::ArcSwap;
use togglebox_core::EvaluationContext;

/// Supplies the ambient context for evaluations that don't pass one.
///
/// Called on every evaluation; implementations return an owned clone the
/// caller may extend.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> EvaluationContext;
}

/// Returns the same context for every evaluation. The context can be
/// swapped at runtime, e.g. when the current user changes.
#[derive(Debug, Default)]
pub struct StaticContextProvider {
    context: ArcSwap<EvaluationContext>,
}

impl StaticContextProvider {
    pub fn new(context: EvaluationContext) -> Self {
        Self {
            context: ArcSwap::from_pointee(context),
        }
    }

    pub fn set(&self, context: EvaluationContext) {
        self.context.store(Arc::new(context));
    }
}

impl ContextProvider for StaticContextProvider {
    fn context(&self) -> EvaluationContext {
        EvaluationContext::clone(&self.context.load())
    }
}

impl<F> ContextProvider for F
where
    F: Fn() -> EvaluationContext + Send + Sync,
{
    fn context(&self) -> EvaluationContext {
        self()
    }
}
