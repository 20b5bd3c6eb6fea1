//! Activation strategies decide whether an enabled toggle is on for a
//! given evaluation context.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use togglebox_core::{ActivationStrategy, EvaluationContext, FeatureToggle};
use tracing::debug;

/// A named activation rule. Evaluation is synchronous and must not block.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool;
}

/// Strategies known to a client, by name.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// A registry with no strategies at all.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// A registry holding every built-in strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DefaultStrategy));
        registry.register(Arc::new(UserWithIdStrategy));
        registry.register(Arc::new(RemoteAddressStrategy));
        registry.register(Arc::new(GradualRolloutUserIdStrategy));
        registry.register(Arc::new(FlexibleRolloutStrategy));
        registry
    }

    /// Add a strategy. A strategy with the same name is replaced.
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(name)
    }

    /// Registered strategy names, sorted. Reported at client registration.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    /// Decide a toggle for a context.
    ///
    /// Disabled toggles are off. An enabled toggle without strategies is on;
    /// otherwise it is on when any of its strategies is. Strategies this
    /// registry does not know evaluate to off.
    pub fn evaluate(&self, toggle: &FeatureToggle, context: &EvaluationContext) -> bool {
        if !toggle.enabled {
            return false;
        }
        if toggle.strategies.is_empty() {
            return true;
        }
        toggle
            .strategies
            .iter()
            .any(|s| self.evaluate_strategy(&toggle.name, s, context))
    }

    fn evaluate_strategy(
        &self,
        toggle: &str,
        activation: &ActivationStrategy,
        context: &EvaluationContext,
    ) -> bool {
        match self.strategies.get(&activation.name) {
            Some(strategy) => strategy.is_enabled(&activation.parameters, context),
            None => {
                debug!(toggle, strategy = %activation.name, "unknown strategy evaluates to off");
                false
            }
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

// ── Built-ins ──────────────────────────────────────────────────

/// Always on.
pub struct DefaultStrategy;

impl Strategy for DefaultStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn is_enabled(&self, _: &HashMap<String, String>, _: &EvaluationContext) -> bool {
        true
    }
}

/// On for the user ids listed in `userIds`.
pub struct UserWithIdStrategy;

impl Strategy for UserWithIdStrategy {
    fn name(&self) -> &str {
        "userWithId"
    }

    fn is_enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool {
        match (&context.user_id, parameters.get("userIds")) {
            (Some(user), Some(list)) => list_contains(list, user),
            _ => false,
        }
    }
}

/// On for the remote addresses listed in `IPs`.
pub struct RemoteAddressStrategy;

impl Strategy for RemoteAddressStrategy {
    fn name(&self) -> &str {
        "remoteAddress"
    }

    fn is_enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool {
        match (&context.remote_address, parameters.get("IPs")) {
            (Some(address), Some(list)) => list_contains(list, address),
            _ => false,
        }
    }
}

/// On for a stable `percentage` of user ids, bucketed per `groupId`.
pub struct GradualRolloutUserIdStrategy;

impl Strategy for GradualRolloutUserIdStrategy {
    fn name(&self) -> &str {
        "gradualRolloutUserId"
    }

    fn is_enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool {
        let Some(user) = context.user_id.as_deref() else {
            return false;
        };
        let group = parameters.get("groupId").map(String::as_str).unwrap_or("");
        in_rollout(group, user, percentage(parameters, "percentage"))
    }
}

/// Like [`GradualRolloutUserIdStrategy`], but the sticky identifier is
/// configurable through `stickiness`: `default` (user id, then session id)
/// or the name of any context field or property.
pub struct FlexibleRolloutStrategy;

impl Strategy for FlexibleRolloutStrategy {
    fn name(&self) -> &str {
        "flexibleRollout"
    }

    fn is_enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool {
        let stickiness = parameters
            .get("stickiness")
            .map(String::as_str)
            .unwrap_or("default");
        let sticky = match stickiness {
            "default" => context
                .user_id
                .as_deref()
                .or(context.session_id.as_deref()),
            field => context.field(field),
        };
        let Some(sticky) = sticky else {
            return false;
        };

        let rollout = if parameters.contains_key("rollout") {
            percentage(parameters, "rollout")
        } else {
            percentage(parameters, "percentage")
        };
        let group = parameters.get("groupId").map(String::as_str).unwrap_or("");
        in_rollout(group, sticky, rollout)
    }
}

fn list_contains(list: &str, needle: &str) -> bool {
    list.split(',').map(str::trim).any(|item| item == needle)
}

/// Parse a percentage parameter, clamped to 0..=100. Missing or invalid is 0.
fn percentage(parameters: &HashMap<String, String>, key: &str) -> u32 {
    parameters
        .get(key)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|p| p.min(100))
        .unwrap_or(0)
}

/// Bucket of `group:id` in 1..=100. Derived from SHA-256, so it is the
/// same across processes, platforms and toolchains.
pub fn normalized_hash(group: &str, id: &str) -> u32 {
    let digest = Sha256::digest(format!("{group}:{id}").as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % 100 + 1
}

fn in_rollout(group: &str, id: &str, percentage: u32) -> bool {
    match percentage {
        0 => false,
        100 => true,
        p => normalized_hash(group, id) <= p,
    }
}
