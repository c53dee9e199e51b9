//! Prefix and age filter policy.

use crate::model::RegistryEntry;
use chrono::{DateTime, Duration, Utc};
use common::config::FilterConfig;

fn cutoff_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Immutable filter inputs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    prefix: Option<String>,
    cutoff: Option<DateTime<Utc>>,
}

impl FilterCriteria {
    /// Build criteria with the cutoff computed as `now - max_age_days`.
    ///
    /// An empty prefix is the same as no prefix. A cutoff earlier than the
    /// representable range clamps to `DateTime::<Utc>::MIN_UTC`.
    pub fn new(prefix: Option<String>, max_age_days: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            cutoff: max_age_days.map(|days| cutoff_before(now, days)),
        }
    }

    pub fn from_config(config: &FilterConfig, now: DateTime<Utc>) -> Self {
        Self::new(config.prefix.clone(), config.max_age_days, now)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.cutoff
    }

    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "prefix={}, cutoff={}",
            self.prefix.as_deref().unwrap_or("<any>"),
            self.cutoff
                .map(|c| c.to_rfc3339())
                .unwrap_or_else(|| "<none>".to_string())
        )
    }
}

/// Why an entry was or was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Retain,
    PrefixMismatch,
    /// Unnamed entries cannot satisfy a prefix.
    UntaggedWithPrefix,
    TooNew,
}

impl FilterVerdict {
    pub fn is_retained(&self) -> bool {
        matches!(self, FilterVerdict::Retain)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            FilterVerdict::Retain => "selected for deletion",
            FilterVerdict::PrefixMismatch => "prefix mismatch",
            FilterVerdict::UntaggedWithPrefix => "untagged entry cannot match prefix",
            FilterVerdict::TooNew => "too new",
        }
    }
}

/// Exact, case-sensitive, byte-wise prefix match. No prefix matches all.
pub fn retain_prefix(name: &str, prefix: Option<&str>) -> bool {
    match prefix {
        None => true,
        Some(prefix) => name.as_bytes().starts_with(prefix.as_bytes()),
    }
}

/// Entries without a timestamp are never excluded by age.
pub fn retain_age(timestamp: Option<DateTime<Utc>>, cutoff: Option<DateTime<Utc>>) -> bool {
    match (cutoff, timestamp) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(cutoff), Some(timestamp)) => timestamp < cutoff,
    }
}

/// Prefix rule AND age rule on the entry's name.
pub fn evaluate(entry: &RegistryEntry, criteria: &FilterCriteria) -> FilterVerdict {
    match (&entry.name, criteria.prefix()) {
        (None, Some(_)) => return FilterVerdict::UntaggedWithPrefix,
        (Some(name), prefix) if !retain_prefix(name, prefix) => {
            return FilterVerdict::PrefixMismatch;
        }
        _ => {}
    }

    age_verdict(entry, criteria)
}

pub fn retain(entry: &RegistryEntry, criteria: &FilterCriteria) -> bool {
    evaluate(entry, criteria).is_retained()
}

/// Selection rule for package versions.
///
/// A version with no tags is always a prefix match; a tagged version matches
/// when any of its tags does. The age rule applies to both.
pub fn evaluate_package_version(entry: &RegistryEntry, criteria: &FilterCriteria) -> FilterVerdict {
    let prefix = criteria.prefix();
    let prefix_ok = entry.tags.is_empty() || entry.tags.iter().any(|tag| retain_prefix(tag, prefix));
    if !prefix_ok {
        return FilterVerdict::PrefixMismatch;
    }

    age_verdict(entry, criteria)
}

fn age_verdict(entry: &RegistryEntry, criteria: &FilterCriteria) -> FilterVerdict {
    if retain_age(entry.updated_at, criteria.cutoff()) {
        FilterVerdict::Retain
    } else {
        FilterVerdict::TooNew
    }
}
