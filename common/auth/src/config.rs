/// Runtime knobs for how members are authenticated.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Accept identity headers set by the forward-auth proxy.
    pub trusted_proxy_headers: bool,
    /// Prefix for member ids minted from an email address.
    pub member_id_prefix: String,
}

impl AuthConfig {
    pub fn new() -> Self {
        Self {
            trusted_proxy_headers: true,
            member_id_prefix: "SF".to_string(),
        }
    }

    pub fn with_trusted_proxy_headers(mut self, trusted: bool) -> Self {
        self.trusted_proxy_headers = trusted;
        self
    }

    pub fn with_member_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.member_id_prefix = prefix.into();
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
