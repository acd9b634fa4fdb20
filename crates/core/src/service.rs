//! Application service records.
//!
//! An [`ApplicationService`] describes one externally-registered service
//! (a bot or protocol bridge): where to push transactions, the credential
//! used to authenticate outbound calls, which optional transaction
//! payloads it understands, and which users it has declared an interest
//! in. Records are owned by an external registry and treated as
//! immutable for the lifetime of a single call.

use regex::RegexSet;

/// One registered application service.
#[derive(Debug, Clone)]
pub struct ApplicationService {
    id: String,
    url: Option<String>,
    hs_token: Option<String>,
    supports_ephemeral: bool,
    supports_transaction_extensions: bool,
    user_namespaces: RegexSet,
}

impl ApplicationService {
    /// Create a service record with no capability flags and no interest
    /// namespaces.
    ///
    /// A `None` url means the service is push-disabled: every outbound
    /// operation short-circuits to its documented no-op result. When
    /// `url` is set the registry is required to also set `hs_token`;
    /// see [`hs_token`](Self::hs_token).
    pub fn new(
        id: impl Into<String>,
        url: Option<String>,
        hs_token: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url,
            hs_token,
            supports_ephemeral: false,
            supports_transaction_extensions: false,
            user_namespaces: RegexSet::empty(),
        }
    }

    /// Mark whether the service accepts ephemeral events and to-device
    /// messages in transactions (MSC2409).
    pub fn with_ephemeral_support(mut self, supported: bool) -> Self {
        self.supports_ephemeral = supported;
        self
    }

    /// Mark whether the service accepts MSC3202 transaction extensions
    /// (one-time key counts, fallback key types, device list summaries).
    pub fn with_transaction_extensions(mut self, supported: bool) -> Self {
        self.supports_transaction_extensions = supported;
        self
    }

    /// Replace the user-interest namespaces with the given regex patterns.
    ///
    /// A user is "interesting" to the service if any pattern matches the
    /// full user ID.
    pub fn with_user_namespaces(mut self, patterns: &[&str]) -> Result<Self, regex::Error> {
        self.user_namespaces = RegexSet::new(patterns)?;
        Ok(self)
    }

    /// Registration ID of this service.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Base push URL, or `None` for a push-disabled service.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Credential sent on every outbound call to the service.
    ///
    /// # Panics
    ///
    /// Panics if the token is unset. A service with a push URL but no
    /// token is a registry misconfiguration, not a remote-service
    /// condition; callers must only reach this after checking
    /// [`url`](Self::url).
    pub fn hs_token(&self) -> &str {
        self.hs_token
            .as_deref()
            .expect("application service has a push URL but no hs_token")
    }

    /// Whether the service accepts MSC2409 ephemeral/to-device payloads.
    pub fn supports_ephemeral(&self) -> bool {
        self.supports_ephemeral
    }

    /// Whether the service accepts MSC3202 transaction extensions.
    pub fn supports_transaction_extensions(&self) -> bool {
        self.supports_transaction_extensions
    }

    /// Whether the service declared an interest in the given user.
    pub fn is_interested_in_user(&self, user_id: &str) -> bool {
        self.user_namespaces.is_match(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_matches_declared_namespaces() {
        let service = ApplicationService::new("irc", None, None)
            .with_user_namespaces(&[r"@irc_.*:example\.com"])
            .unwrap();

        assert!(service.is_interested_in_user("@irc_alice:example.com"));
        assert!(!service.is_interested_in_user("@bob:example.com"));
    }

    #[test]
    fn empty_namespaces_match_nothing() {
        let service = ApplicationService::new("bot", None, None);
        assert!(!service.is_interested_in_user("@anyone:example.com"));
    }

    #[test]
    fn hs_token_returns_configured_credential() {
        let service = ApplicationService::new(
            "bot",
            Some("http://as.example.com".to_string()),
            Some("secret".to_string()),
        );
        assert_eq!(service.hs_token(), "secret");
    }

    #[test]
    #[should_panic(expected = "no hs_token")]
    fn hs_token_panics_when_misconfigured() {
        let service =
            ApplicationService::new("bot", Some("http://as.example.com".to_string()), None);
        let _ = service.hs_token();
    }
}
