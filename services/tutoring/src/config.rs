use serde::{Deserialize, Serialize};
use tutorlink_common::{env_parse, DatabaseConfig, JwtConfig, ServerConfig};

pub const DEFAULT_PORT: u16 = 8001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub booking: BookingConfig,
}

/// Knobs for the booking-request workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Session length used when neither the request nor the tutor provides one.
    pub fallback_session_minutes: i32,
    /// Refuse to accept requests for dates the tutor has no open weekly window on.
    pub enforce_availability: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            fallback_session_minutes: 60,
            enforce_availability: false,
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fallback_session_minutes: env_parse(
                "BOOKING_FALLBACK_SESSION_MINUTES",
                defaults.fallback_session_minutes,
            )
            .max(1),
            enforce_availability: env_parse(
                "BOOKING_ENFORCE_AVAILABILITY",
                defaults.enforce_availability,
            ),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(DEFAULT_PORT),
            database: DatabaseConfig::from_env(),
            jwt: JwtConfig::from_env(),
            booking: BookingConfig::from_env(),
        }
    }
}
