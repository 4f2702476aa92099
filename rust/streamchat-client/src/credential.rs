use std::fmt;

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

    pub fn token(&self) -> &str { &self.0 }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Holds at most one live credential for a session.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: Option<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, credential: Credential) { self.current = Some(credential); }

    pub fn get(&self) -> Option<&Credential> { self.current.as_ref() }

    /// Returns the cleared credential, if any.
    pub fn clear(&mut self) -> Option<Credential> { self.current.take() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let c = Credential::new("eyJhbGciOi.secret");
        assert!(!format!("{:?}", c).contains("secret"));
    }

    #[test]
    fn set_replaces_and_clear_empties() {
        let mut store = CredentialStore::new();
        store.set(Credential::new("a"));
        store.set(Credential::new("b"));
        assert_eq!(store.get().map(Credential::token), Some("b"));
        assert_eq!(store.clear().map(|c| c.token().to_string()), Some("b".to_string()));
        assert!(store.get().is_none());
        assert!(store.clear().is_none());
    }
}
