//! The `selector` entry.
//!
//! A selector is not a middleware. It names which of the other entries stay
//! in the chain: `includes` keeps only the listed names (all when empty),
//! then `excludes` drops the listed names.

use crate::chain::Chain;
use crate::factory::MiddlewareFactory;
use serde::Deserialize;

/// Selector settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectorSettings {
    /// Names to keep.
    pub includes: Vec<String>,
    /// Names to drop.
    pub excludes: Vec<String>,
}

impl SelectorSettings {
    /// Applies the filter to `chain`.
    #[must_use]
    pub fn apply(&self, chain: Chain) -> Chain {
        chain.filter(&self.includes, &self.excludes)
    }
}

/// Factory registered under `selector`. It produces nothing for either side;
/// the builder reads selector entries directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorFactory;

impl MiddlewareFactory for SelectorFactory {}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_config::MiddlewareEntry;
    use serde_json::json;

    #[test]
    fn test_settings_from_entry() {
        let entry = MiddlewareEntry::new("", "selector")
            .with_setting("includes", json!(["logging"]))
            .with_setting("excludes", json!(["metrics"]));
        let settings: SelectorSettings = entry.settings().unwrap();
        assert_eq!(settings.includes, vec!["logging"]);
        assert_eq!(settings.excludes, vec!["metrics"]);
    }

    #[test]
    fn test_empty_settings_keep_everything() {
        let settings = SelectorSettings::default();
        let chain = settings.apply(Chain::new(crate::Side::Server));
        assert!(chain.is_empty());
    }
}
