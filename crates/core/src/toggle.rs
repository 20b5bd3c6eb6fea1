use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque version marker for a fetched toggle set (the HTTP `ETag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One activation strategy attached to a toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationStrategy {
    pub name: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl ActivationStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// A single feature toggle definition as served by the toggle service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureToggle {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub strategies: Vec<ActivationStrategy>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl FeatureToggle {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled,
            strategies: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: ActivationStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }
}

/// The complete set of toggles from one successful fetch.
///
/// Immutable once built: a newer fetch produces a new `FlagSet` that replaces
/// this one wholesale. On the wire `features` is a list; in memory it is
/// indexed by toggle name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSet {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(
        default,
        serialize_with = "serialize_features",
        deserialize_with = "deserialize_features"
    )]
    features: HashMap<String, FeatureToggle>,
}

fn default_version() -> u32 {
    1
}

impl Default for FlagSet {
    fn default() -> Self {
        Self {
            version: default_version(),
            features: HashMap::new(),
        }
    }
}

impl FlagSet {
    /// Build a set from a list of toggles. Later duplicates win.
    pub fn new(features: impl IntoIterator<Item = FeatureToggle>) -> Self {
        Self {
            version: default_version(),
            features: features
                .into_iter()
                .map(|toggle| (toggle.name.clone(), toggle))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureToggle> {
        self.features.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureToggle> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn serialize_features<S>(
    features: &HashMap<String, FeatureToggle>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut sorted: Vec<&FeatureToggle> = features.values().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted.serialize(serializer)
}

fn deserialize_features<'de, D>(deserializer: D) -> Result<HashMap<String, FeatureToggle>, D::Error>
where
    D: Deserializer<'de>,
{
    let list: Vec<FeatureToggle> = Vec::deserialize(deserializer)?;
    Ok(list
        .into_iter()
        .map(|toggle| (toggle.name.clone(), toggle))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_payload() {
        let raw = r#"{
            "version": 1,
            "features": [
                {
                    "name": "checkout.new-flow",
                    "enabled": true,
                    "strategies": [
                        { "name": "userWithId", "parameters": { "userIds": "42,43" } }
                    ]
                },
                { "name": "search.beta", "enabled": false }
            ]
        }"#;

        let set: FlagSet = serde_json::from_str(raw).unwrap();
        assert_eq!(set.len(), 2);
        let toggle = set.get("checkout.new-flow").unwrap();
        assert!(toggle.enabled);
        assert_eq!(toggle.strategies[0].parameters["userIds"], "42,43");
        assert!(set.get("search.beta").unwrap().strategies.is_empty());
    }

    #[test]
    fn serializes_features_as_sorted_list() {
        let set = FlagSet::new([FeatureToggle::new("b", true), FeatureToggle::new("a", false)]);
        let value = serde_json::to_value(&set).unwrap();
        let names: Vec<&str> = value["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn later_duplicate_wins() {
        let set = FlagSet::new([FeatureToggle::new("a", false), FeatureToggle::new("a", true)]);
        assert_eq!(set.len(), 1);
        assert!(set.get("a").unwrap().enabled);
    }
}
