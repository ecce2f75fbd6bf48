//! Persistent user/group attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::JsonMap;

pub(crate) const ANONYMOUS_ID_KEY: &str = "anonymousId";
pub(crate) const USER_ID_KEY: &str = "userId";

/// A string-keyed map of attributes describing a user or a group.
///
/// Traits are merged, not replaced, across identify calls, and always carry an `anonymousId`
/// generated on first use. They are persisted through the traits cache keyed by client tag, read
/// once at startup and written back on every identify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Traits(JsonMap);

impl Traits {
    /// Create an empty traits map. Mostly useful for group traits and tests; user traits should
    /// start from [`Traits::anonymous`].
    pub fn new() -> Traits {
        Traits::default()
    }

    /// Create traits carrying a freshly generated anonymous identity.
    pub fn anonymous() -> Traits {
        let mut traits = Traits::default();
        traits.0.insert(
            ANONYMOUS_ID_KEY.to_owned(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
        traits
    }

    /// Insert a trait value, replacing any previous value under the same key.
    pub fn put(mut self, key: impl Into<String>, value: impl Into<Value>) -> Traits {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        self.0.get(ANONYMOUS_ID_KEY).and_then(Value::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0.get(USER_ID_KEY).and_then(Value::as_str)
    }

    pub(crate) fn set_user_id(&mut self, user_id: &str) {
        self.0
            .insert(USER_ID_KEY.to_owned(), Value::String(user_id.to_owned()));
    }

    /// The identity events should be attributed to: the user id once known, the anonymous id
    /// before that.
    pub fn current_id(&self) -> Option<&str> {
        self.user_id().or_else(|| self.anonymous_id())
    }

    /// Merge `other` into `self`. Values from `other` win on conflicting keys; keys absent from
    /// `other` are kept as-is.
    pub fn merge(&mut self, other: &Traits) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &JsonMap {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Traits;

    #[test]
    fn anonymous_traits_carry_an_id() {
        let traits = Traits::anonymous();

        assert_eq!(traits.len(), 1);
        assert!(!traits.anonymous_id().unwrap().is_empty());
        assert_eq!(traits.user_id(), None);
        assert_eq!(traits.current_id(), traits.anonymous_id());
    }

    #[test]
    fn merge_keeps_existing_keys() {
        let mut traits = Traits::anonymous().put("plan", "free");
        let anonymous_id = traits.anonymous_id().unwrap().to_owned();

        traits.merge(&Traits::new().put("plan", "paid").put("seats", 3));

        assert_eq!(traits.get("plan").unwrap(), "paid");
        assert_eq!(traits.get("seats").unwrap(), 3);
        assert_eq!(traits.anonymous_id().unwrap(), anonymous_id);
    }

    #[test]
    fn user_id_takes_over_as_current_id() {
        let mut traits = Traits::anonymous();
        traits.set_user_id("prayansh");

        assert_eq!(traits.current_id(), Some("prayansh"));
    }
}
