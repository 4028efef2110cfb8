//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_analysis_config_default() {
        let config = AnalysisConfig::default();
        assert_eq!(config.platform, "polymarket");
        assert_eq!(config.trade_statuses, vec!["resolved", "exited"]);
        assert_eq!(
            config.split_date,
            Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap()
        );
        assert_eq!(config.focus_city, "seoul");
        assert_eq!(config.min_train_samples, 5);
        assert_eq!(config.predictions_path, "ml_predictions_test.csv");
    }

    #[test]
    fn test_analysis_config_empty_toml_defaults() {
        let config: AnalysisConfig = toml::from_str("").unwrap();
        assert_eq!(config.platform, "polymarket");
        assert_eq!(config.trade_statuses, vec!["resolved", "exited"]);
        assert_eq!(config.min_train_samples, 5);
    }

    #[test]
    fn test_analysis_config_deserialize() {
        let toml_str = r#"
platform = "kalshi"
trade_statuses = ["resolved"]
split_date = "2026-03-01T00:00:00Z"
focus_city = "tokyo"
min_train_samples = 10
predictions_path = "out/preds.csv"
"#;
        let config: AnalysisConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform, "kalshi");
        assert_eq!(config.trade_statuses, vec!["resolved"]);
        assert_eq!(
            config.split_date,
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(config.focus_city, "tokyo");
        assert_eq!(config.min_train_samples, 10);
        assert_eq!(config.predictions_path, "out/preds.csv");
    }

    #[test]
    fn test_database_config() {
        let toml_str = r#"
url = "postgres://bot:pw@localhost/trading"
"#;
        let config: DatabaseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.url, "postgres://bot:pw@localhost/trading");
    }

    #[test]
    fn test_app_config_empty_toml_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.database.url.is_empty());
        assert_eq!(config.analysis.platform, "polymarket");
        assert_eq!(config.analysis.focus_city, "seoul");
    }

    #[test]
    fn test_env_override_uses_double_underscore_prefix() {
        // The prefix and the nesting levels are both separated by `__`.
        std::env::set_var("TRADESCOPE__DATABASE__URL", "postgres://localhost/trading");
        std::env::set_var("TRADESCOPE__ANALYSIS__FOCUS_CITY", "osaka");

        let config = AppConfig::load("no-such-config.toml").unwrap();
        assert_eq!(config.analysis.focus_city, "osaka");
        // Untouched knobs keep their defaults.
        assert_eq!(config.analysis.platform, "polymarket");

        // DATABASE_URL stays the conventional override for the url itself.
        std::env::set_var("DATABASE_URL", "postgres://db/override");
        let config = AppConfig::load("no-such-config.toml").unwrap();
        assert_eq!(config.database.url, "postgres://db/override");

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("TRADESCOPE__DATABASE__URL");
        std::env::remove_var("TRADESCOPE__ANALYSIS__FOCUS_CITY");
    }
}
