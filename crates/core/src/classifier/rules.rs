//! Quality rule groups.
//!
//! A candidate's quality rank is the priority of the first rule in its group
//! that it satisfies. Lower ranks are better; a candidate that satisfies no
//! rule is rejected.

use std::collections::HashMap;

use regex_lite::Regex;
use thiserror::Error;

use crate::config::{QualityRuleConfig, RuleGroupConfig};
use crate::media::MediaType;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{group}/{rule}': invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        group: String,
        rule: String,
        pattern: String,
        message: String,
    },

    #[error("rule '{group}/{rule}': invalid promotion '{value}', expected \"<up> <down>\"")]
    InvalidPromotion {
        group: String,
        rule: String,
        value: String,
    },
}

/// The parts of a candidate that rules look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleSubject<'a> {
    /// Release title and description, space separated.
    pub text: &'a str,
    pub size_bytes: u64,
    pub media_type: MediaType,
    /// Episodes the payload carries, when known; TV sizes are checked per episode.
    pub episode_count: Option<u32>,
    pub upload_factor: f64,
    pub download_factor: f64,
}

#[derive(Debug, Clone)]
struct QualityRule {
    name: String,
    priority: u32,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    min_size_gb: Option<f64>,
    max_size_gb: Option<f64>,
    promotion: Option<(f64, f64)>,
}

impl QualityRule {
    fn compile(group: &str, config: &QualityRuleConfig) -> Result<Self, RuleError> {
        let compile_all = |patterns: &[String]| -> Result<Vec<Regex>, RuleError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("(?i){}", p)).map_err(|e| RuleError::InvalidPattern {
                        group: group.to_string(),
                        rule: config.name.clone(),
                        pattern: p.clone(),
                        message: e.to_string(),
                    })
                })
                .collect()
        };

        let promotion = match &config.promotion {
            None => None,
            Some(value) => Some(parse_promotion(value).ok_or_else(|| {
                RuleError::InvalidPromotion {
                    group: group.to_string(),
                    rule: config.name.clone(),
                    value: value.clone(),
                }
            })?),
        };

        Ok(Self {
            name: config.name.clone(),
            priority: config.priority,
            include: compile_all(&config.include)?,
            exclude: compile_all(&config.exclude)?,
            min_size_gb: config.min_size_gb,
            max_size_gb: config.max_size_gb,
            promotion,
        })
    }

    fn matches(&self, subject: &RuleSubject<'_>) -> bool {
        if !self.include.iter().all(|re| re.is_match(subject.text)) {
            return false;
        }
        if self.exclude.iter().any(|re| re.is_match(subject.text)) {
            return false;
        }

        let mut size_gb = subject.size_bytes as f64 / BYTES_PER_GB;
        if subject.media_type == MediaType::Tv {
            if let Some(count) = subject.episode_count.filter(|c| *c > 0) {
                size_gb /= count as f64;
            }
        }
        if self.min_size_gb.map(|min| size_gb < min).unwrap_or(false) {
            return false;
        }
        if self.max_size_gb.map(|max| size_gb > max).unwrap_or(false) {
            return false;
        }

        if let Some((min_up, max_down)) = self.promotion {
            if subject.upload_factor < min_up || subject.download_factor > max_down {
                return false;
            }
        }
        true
    }
}

fn parse_promotion(value: &str) -> Option<(f64, f64)> {
    let mut parts = value.split_whitespace();
    let up = parts.next()?.parse().ok()?;
    let down = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((up, down))
}

/// A named, priority-ordered list of rules.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    name: String,
    rules: Vec<QualityRule>,
}

impl RuleGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the rule that gave `rank`, for logging.
    pub fn rule_name(&self, rank: u32) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.priority == rank)
            .map(|r| r.name.as_str())
    }
}

/// All configured rule groups.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    groups: HashMap<String, RuleGroup>,
    default_group: Option<String>,
}

impl RuleBook {
    /// A book with no groups: every candidate passes with rank 0.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_config(
        groups: &[RuleGroupConfig],
        default_group: Option<String>,
    ) -> Result<Self, RuleError> {
        let mut compiled = HashMap::new();
        for group in groups {
            let mut rules = group
                .rules
                .iter()
                .map(|r| QualityRule::compile(&group.name, r))
                .collect::<Result<Vec<_>, _>>()?;
            rules.sort_by_key(|r| r.priority);
            compiled.insert(
                group.name.clone(),
                RuleGroup {
                    name: group.name.clone(),
                    rules,
                },
            );
        }
        Ok(Self {
            groups: compiled,
            default_group,
        })
    }

    /// The named group, falling back to the default group.
    pub fn group(&self, name: Option<&str>) -> Option<&RuleGroup> {
        name.or(self.default_group.as_deref())
            .and_then(|n| self.groups.get(n))
    }

    /// Quality rank of a candidate, or `None` when every rule rejects it.
    pub fn rank(&self, group: Option<&str>, subject: &RuleSubject<'_>) -> Option<u32> {
        match self.group(group) {
            None => Some(0),
            Some(g) if g.rules.is_empty() => Some(0),
            Some(g) => g
                .rules
                .iter()
                .find(|r| r.matches(subject))
                .map(|r| r.priority),
        }
    }

    /// Best rank the group can award; reaching it ends quality upgrades.
    pub fn first_acceptable_rank(&self, group: Option<&str>) -> Option<u32> {
        self.group(group)
            .and_then(|g| g.rules.iter().map(|r| r.priority).min())
    }
}
