//! Request-scoped evaluation context.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The context a toggle is evaluated against, usually scoped to one request.
///
/// Cloning deep-copies `properties`, so a clone taken from an ambient
/// context can be extended per call without affecting other evaluations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub remote_address: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl EvaluationContext {
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    /// Merge `properties` into this context. Existing keys are overwritten.
    pub fn append_properties(&mut self, properties: &HashMap<String, String>) {
        for (key, value) in properties {
            self.properties.insert(key.clone(), value.clone());
        }
    }

    /// Look up a context field by the name strategies use for it.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "userId" => self.user_id.as_deref(),
            "sessionId" => self.session_id.as_deref(),
            "remoteAddress" => self.remote_address.as_deref(),
            other => self.properties.get(other).map(String::as_str),
        }
    }
}

#[derive(Debug, Default)]
pub struct EvaluationContextBuilder {
    user_id: Option<String>,
    session_id: Option<String>,
    remote_address: Option<String>,
    properties: HashMap<String, String>,
}

impl EvaluationContextBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn remote_address(mut self, remote_address: impl Into<String>) -> Self {
        self.remote_address = Some(remote_address.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> EvaluationContext {
        EvaluationContext {
            user_id: self.user_id,
            session_id: self.session_id,
            remote_address: self.remote_address,
            properties: self.properties,
        }
    }
}
