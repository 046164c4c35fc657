use std::collections::HashSet;

use crate::classifier::RuleBook;

use super::{types::Config, ConfigError, DownloadClientBackend, IndexerBackend};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker and poll bounds are non-zero
/// - Rule groups have unique names and compilable patterns
/// - The default rule group exists
/// - Backend sections are present for the selected backends
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.search.max_parallel_sites == 0 {
        return Err(ConfigError::ValidationError(
            "search.max_parallel_sites must be at least 1".to_string(),
        ));
    }

    if config.selection.poll_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "selection.poll_attempts must be at least 1".to_string(),
        ));
    }

    if config.subscription.enabled && config.subscription.scan_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "subscription.scan_interval_secs cannot be 0 when enabled".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for group in &config.rule_groups {
        if !names.insert(group.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate rule group '{}'",
                group.name
            )));
        }
    }

    RuleBook::from_config(&config.rule_groups, config.default_rule_group.clone())
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    if let Some(default) = &config.default_rule_group {
        if !names.contains(default.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "default_rule_group '{}' is not defined",
                default
            )));
        }
    }

    if let Some(indexer) = &config.indexer {
        match indexer.backend {
            IndexerBackend::Jackett => match &indexer.jackett {
                None => {
                    return Err(ConfigError::ValidationError(
                        "indexer.jackett section is required for the jackett backend".to_string(),
                    ))
                }
                Some(jackett) if jackett.sites.is_empty() => {
                    return Err(ConfigError::ValidationError(
                        "indexer.jackett.sites cannot be empty".to_string(),
                    ))
                }
                Some(_) => {}
            },
        }
    }

    if let Some(client) = &config.download_client {
        match client.backend {
            DownloadClientBackend::QBittorrent => {
                if client.qbittorrent.is_none() {
                    return Err(ConfigError::ValidationError(
                        "download_client.qbittorrent section is required".to_string(),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, QualityRuleConfig, RuleGroupConfig};

    fn rule(name: &str, priority: u32, include: &[&str]) -> QualityRuleConfig {
        QualityRuleConfig {
            name: name.to_string(),
            priority,
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: vec![],
            min_size_gb: None,
            max_size_gb: None,
            promotion: None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_parallel_sites_fails() {
        let mut config = Config::default();
        config.search.max_parallel_sites = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_rule_group() {
        let mut config = Config::default();
        config.rule_groups = vec![
            RuleGroupConfig {
                name: "hd".to_string(),
                rules: vec![rule("a", 1, &[])],
            },
            RuleGroupConfig {
                name: "hd".to_string(),
                rules: vec![rule("b", 2, &[])],
            },
        ];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_bad_regex() {
        let mut config = Config::default();
        config.rule_groups = vec![RuleGroupConfig {
            name: "hd".to_string(),
            rules: vec![rule("broken", 1, &["(unclosed"])],
        }];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_default_group() {
        let mut config = Config::default();
        config.default_rule_group = Some("missing".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validate_jackett_without_sites() {
        let config = load_config_from_str(
            r#"
[indexer]
backend = "jackett"

[indexer.jackett]
url = "http://localhost:9117"
api_key = "key"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_qbittorrent_section_missing() {
        let config = load_config_from_str(
            r#"
[download_client]
backend = "qbittorrent"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
