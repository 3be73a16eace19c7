use uuid::Uuid;

/// Anti-forgery key issued once per process. Clients fetch it via
/// `session.token` and echo it on every state-mutating request; reads never
/// need it.
#[derive(Debug, Clone)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn issue() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, candidate: Option<&str>) -> bool {
        candidate == Some(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_keys_are_distinct() {
        let a = SessionKey::issue();
        let b = SessionKey::issue();
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn matches_only_the_exact_value() {
        let key = SessionKey::issue();
        assert!(key.matches(Some(key.value())));
        assert!(!key.matches(Some("nope")));
        assert!(!key.matches(None));
    }
}
