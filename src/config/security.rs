//! Socket authentication configuration.

use super::defaults::default_access_cookie;
use serde::{Deserialize, Serialize};

/// Settings for the cookie bearer-token handshake.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing key shared with the HTTP login service.
    /// Empty means tokens cannot verify and every socket is rejected.
    #[serde(default)]
    pub token_secret: String,
    /// Cookie carrying the bearer token
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            access_cookie: default_access_cookie(),
        }
    }
}
