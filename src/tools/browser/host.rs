//! Host locale and timezone detection.

use std::env;

use tracing::debug;

use crate::core::config::BrowserConfig;

/// Used when the host locale is unset or "C"/"POSIX".
pub const DEFAULT_LOCALE: &str = "en-US";

/// Used when no timezone can be detected.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Locale and timezone the browser emulates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub locale: String,
    pub timezone: String,
}

impl HostEnvironment {
    /// Detect from the host, honouring config overrides.
    pub fn detect(config: &BrowserConfig) -> Self {
        let locale = config.locale.clone().unwrap_or_else(|| {
            let raw = ["LC_ALL", "LC_MESSAGES", "LANG"]
                .iter()
                .filter_map(|key| env::var(key).ok())
                .find(|value| !value.is_empty());
            normalize_locale(raw.as_deref())
        });

        let timezone = config
            .timezone
            .clone()
            .or_else(host_timezone)
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        Self { locale, timezone }
    }
}

/// `en_US.UTF-8` -> `en-US`; unusable values fall back to [`DEFAULT_LOCALE`].
pub fn normalize_locale(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_LOCALE.to_string();
    };

    let base = raw
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "C" || base == "POSIX" {
        return DEFAULT_LOCALE.to_string();
    }

    base.replace('_', "-")
}

/// IANA name of the host zone, e.g. `Europe/Paris`
fn host_timezone() -> Option<String> {
    match iana_time_zone::get_timezone() {
        Ok(tz) if !tz.trim().is_empty() => Some(tz),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "host timezone unavailable, using {}", DEFAULT_TIMEZONE);
            None
        }
    }
}
