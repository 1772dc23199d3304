//! Gateway authentication: a single shared bearer token, compared in constant
//! time (mirrors `agenticlaw-gateway::auth::ResolvedAuth`, minus its multiple
//! auth-mode enum — the orchestrator only ever needs a shared-key check or
//! none at all).

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug)]
pub struct GatewayAuth {
    token: Option<String>,
}

impl GatewayAuth {
    pub fn new(token: Option<String>) -> Self {
        GatewayAuth { token }
    }

    /// The configured shared token, if auth is enabled. Used to seed the
    /// "self" tool-server entry a spawned agent needs to call back in.
    pub fn token(&self) -> &str {
        self.token.as_deref().unwrap_or("")
    }

    /// `None` token means auth is disabled (local/dev use); any request passes.
    pub fn verify(&self, provided: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(expected) => match provided {
                Some(given) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auth_accepts_anything() {
        let auth = GatewayAuth::new(None);
        assert!(auth.verify(None));
        assert!(auth.verify(Some("anything")));
    }

    #[test]
    fn enabled_auth_requires_matching_token() {
        let auth = GatewayAuth::new(Some("secret-key".to_string()));
        assert!(auth.verify(Some("secret-key")));
        assert!(!auth.verify(Some("wrong-key")));
        assert!(!auth.verify(None));
    }
}
