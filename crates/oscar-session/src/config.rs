//! Session configuration.

use oscar_wire::FlapConfig;

/// The AIM authorizer host dialed when none is configured.
pub const DEFAULT_LOGIN_HOST: &str = "login.messaging.aol.com";

/// The standard OSCAR port.
pub const DEFAULT_LOGIN_PORT: u16 = 5190;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Screen name this session signs on as.
    pub screen_name: String,
    /// Authorizer host `connect_auth` dials.
    pub login_host: String,
    /// Authorizer port; also the fallback when a redirect names no port.
    pub login_port: u16,
    /// Frame codec limits.
    pub flap: FlapConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            screen_name: String::new(),
            login_host: DEFAULT_LOGIN_HOST.to_string(),
            login_port: DEFAULT_LOGIN_PORT,
            flap: FlapConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given screen name.
    pub fn for_screen_name(screen_name: impl Into<String>) -> Self {
        Self {
            screen_name: screen_name.into(),
            ..Self::default()
        }
    }
}
