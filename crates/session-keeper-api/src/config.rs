//! Configuration types for the HTTP service

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Session cookie settings
    pub session: SessionConfig,

    /// Admin endpoint settings
    pub admin: AdminConfig,
}

impl ServiceConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "server.host must not be empty".to_string(),
            });
        }

        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "session.cookie_name '{}' is not a valid cookie name",
                    self.session.cookie_name
                ),
            });
        }

        if !matches!(
            self.session.same_site.as_str(),
            "Strict" | "Lax" | "None"
        ) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "session.same_site must be Strict, Lax or None, got '{}'",
                    self.session.same_site
                ),
            });
        }

        if self.session.same_site == "None" && !self.session.secure {
            return Err(ConfigError::Invalid {
                message: "session.same_site = None requires session.secure = true".to_string(),
            });
        }

        if let Some(token) = &self.admin.token {
            if token.len() < 16 {
                return Err(ConfigError::Invalid {
                    message: "admin.token must be at least 16 characters".to_string(),
                });
            }
        }

        if self.admin.enabled && self.admin.token.is_none() {
            return Err(ConfigError::Invalid {
                message: "admin.enabled requires admin.token".to_string(),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie_name: String,

    /// Cookie `Path` attribute
    pub cookie_path: String,

    /// Set the `Secure` attribute
    pub secure: bool,

    /// `SameSite` attribute: `Strict`, `Lax` or `None`
    pub same_site: String,

    /// `Max-Age` attribute in seconds; session cookie when unset
    pub max_age_seconds: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            cookie_path: "/".to_string(),
            secure: true,
            same_site: "Lax".to_string(),
            max_age_seconds: Some(24 * 60 * 60),
        }
    }
}

impl SessionConfig {
    /// Render a `Set-Cookie` header value carrying `value`
    pub fn set_cookie_header(&self, value: &str) -> String {
        let mut header = format!(
            "{}={}; Path={}; HttpOnly; SameSite={}",
            self.cookie_name, value, self.cookie_path, self.same_site
        );
        if self.secure {
            header.push_str("; Secure");
        }
        if let Some(max_age) = self.max_age_seconds {
            header.push_str(&format!("; Max-Age={}", max_age));
        }
        header
    }
}

/// Admin endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes
    pub enabled: bool,

    /// Bearer token required by admin routes; requests are refused when unset
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
        }
    }
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("enabled", &self.enabled)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
