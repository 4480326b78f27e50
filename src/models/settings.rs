//! Operator settings for scheduling and timeouts

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Process-wide fetch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    /// Period of the scheduler tick, in minutes (1-1440)
    pub scan_interval_minutes: u32,
    /// Ceiling for fetching all remotes of one repository, in seconds (10-3600)
    pub operation_timeout_secs: u64,
    /// Ceiling for a single remote's network fetch, in seconds (1-60)
    pub connection_timeout_secs: u64,
    pub auto_fetch: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            scan_interval_minutes: 60,
            operation_timeout_secs: 300,
            connection_timeout_secs: 5,
            auto_fetch: true,
        }
    }
}

impl FetchSettings {
    pub fn validate(&self) -> Result<()> {
        check_range("scanIntervalMinutes", u64::from(self.scan_interval_minutes), 1, 1440)?;
        check_range("operationTimeoutSecs", self.operation_timeout_secs, 10, 3600)?;
        check_range("connectionTimeoutSecs", self.connection_timeout_secs, 1, 60)?;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_interval_minutes) * 60)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(WardenError::InvalidSetting(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = FetchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.operation_timeout(), Duration::from_secs(300));
        assert_eq!(settings.connection_timeout(), Duration::from_secs(5));
        assert_eq!(settings.scan_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let settings = FetchSettings {
            connection_timeout_secs: 0,
            ..FetchSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(WardenError::InvalidSetting(_))
        ));

        let settings = FetchSettings {
            operation_timeout_secs: 5,
            ..FetchSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = FetchSettings {
            scan_interval_minutes: 1441,
            ..FetchSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: FetchSettings =
            serde_json::from_str(r#"{"connectionTimeoutSecs": 10}"#).unwrap();
        assert_eq!(settings.connection_timeout_secs, 10);
        assert_eq!(settings.operation_timeout_secs, 300);
        assert!(settings.auto_fetch);
    }
}
