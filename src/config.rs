#[derive(Debug, Clone)]
pub struct BookingsConfig {
    pub strict_dates: bool,  // default filter mode, overridable per request
    pub upcoming_days: i64,  // width of the upcoming view
}

/// Widest upcoming view, one year ahead.
pub const MAX_UPCOMING_DAYS: i64 = 365;

impl Default for BookingsConfig {
    fn default() -> Self {
        Self {
            strict_dates: false,
            upcoming_days: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bookings: BookingsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let defaults = BookingsConfig::default();
        let bookings = BookingsConfig {
            strict_dates: std::env::var("BOOKINGS_STRICT_DATES")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.strict_dates),
            upcoming_days: parse_upcoming_days(std::env::var("UPCOMING_DAYS").ok().as_deref())
                .unwrap_or(defaults.upcoming_days),
        };
        Ok(Self {
            database_url,
            max_connections,
            bookings,
        })
    }
}

/// Non-negative day count, capped at [`MAX_UPCOMING_DAYS`].
fn parse_upcoming_days(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|days| *days >= 0)
        .map(|days| days.min(MAX_UPCOMING_DAYS))
}
