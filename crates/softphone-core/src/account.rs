//! Account data bound to a logged-in softphone
//!
//! An [`Account`] is created at login and lives until logout. The user profile
//! supplied by the host is copied into an immutable [`UserProfile`] snapshot;
//! the core stores it and hands it back unchanged but never reads its values.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Authentication credentials for the registrar
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Authentication realm, when the server requires a specific one
    pub realm: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), realm: None }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }
}

// Keep passwords out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

/// Opaque host-supplied profile, frozen at login
///
/// Values are arbitrary JSON and are handed back exactly as supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Arc<BTreeMap<String, Value>>);

impl UserProfile {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Shorthand for entries the host stored as strings
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Owned copy of the stored entries
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.0.as_ref().clone()
    }
}

impl<K, V> FromIterator<(K, V)> for UserProfile
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        UserProfile(Arc::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()))
    }
}

impl From<BTreeMap<String, Value>> for UserProfile {
    fn from(map: BTreeMap<String, Value>) -> Self {
        UserProfile(Arc::new(map))
    }
}

/// A SIP account: who registers, where, and with which credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Address-of-record, e.g. `sip:agent42@pbx.example.com`
    pub aor: String,
    /// Registrar / outbound proxy, e.g. `sip:pbx.example.com:5060`
    pub server: String,
    pub credentials: Credentials,
    pub display_name: Option<String>,
    pub profile: UserProfile,
}

impl Account {
    pub fn new(aor: impl Into<String>, server: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            aor: aor.into(),
            server: server.into(),
            credentials,
            display_name: None,
            profile: UserProfile::default(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Attach the host profile. The map is copied; later changes made by the
    /// host are not seen by the core.
    pub fn with_profile<I, K, V>(mut self, profile: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.profile = profile.into_iter().collect();
        self
    }

    /// Check that the addresses parse as URIs and a username is present
    pub fn validate(&self) -> ClientResult<()> {
        for (field, value) in [("aor", &self.aor), ("server", &self.server)] {
            Url::parse(value).map_err(|e| {
                ClientError::invalid_configuration(field, format!("'{value}' is not a valid URI: {e}"))
            })?;
        }
        if self.credentials.username.trim().is_empty() {
            return Err(ClientError::invalid_configuration("credentials.username", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(
            "sip:agent42@pbx.example.com",
            "sip:pbx.example.com:5060",
            Credentials::new("agent42", "s3cret"),
        )
    }

    #[test]
    fn test_validate() {
        assert!(account().validate().is_ok());

        let mut bad = account();
        bad.server = "not a uri".into();
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration { ref field, .. } if field == "server"));

        let mut bad = account();
        bad.credentials.username = "  ".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_profile_is_a_snapshot() {
        let mut source = BTreeMap::new();
        source.insert("tenant".to_string(), "acme".to_string());
        source.insert("queue".to_string(), "billing".to_string());

        let account = account().with_profile(source.clone());
        source.insert("queue".to_string(), "sales".to_string());

        assert_eq!(account.profile.get_str("queue"), Some("billing"));
        assert_eq!(account.profile.len(), 2);
    }

    #[test]
    fn test_profile_values_are_returned_unchanged() {
        let skills = serde_json::json!({ "languages": ["en", "de"], "tier": 2 });
        let account = account().with_profile([
            ("tenant", serde_json::json!("acme")),
            ("max_calls", serde_json::json!(3)),
            ("wrap_up", serde_json::json!(true)),
            ("skills", skills.clone()),
        ]);

        assert_eq!(account.profile.get("max_calls"), Some(&serde_json::json!(3)));
        assert_eq!(account.profile.get("wrap_up"), Some(&Value::Bool(true)));
        assert_eq!(account.profile.get("skills"), Some(&skills));
        assert_eq!(account.profile.get_str("tenant"), Some("acme"));
        assert_eq!(account.profile.get_str("max_calls"), None);

        // Serializes as the plain map the host supplied
        let encoded = serde_json::to_value(&account.profile).unwrap();
        assert_eq!(encoded["skills"]["languages"][1], "de");
        let decoded: UserProfile = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, account.profile);
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", account().credentials);
        assert!(rendered.contains("agent42"));
        assert!(!rendered.contains("s3cret"));
    }
}
