//! Label selectors as accepted by `cf orgs --labels` and friends.
//!
//! Used to compute which fixtures a selector should return, so listing
//! scenarios can assert the exact result set.

use crate::error::{HarnessError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    NotExists(String),
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::NotExists(key) => !labels.contains_key(key),
        }
    }
}

/// A conjunction of requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let error = |reason: &str| HarnessError::Selector {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let clauses = split_clauses(input).ok_or_else(|| error("unbalanced parentheses"))?;
        let mut requirements = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(error("empty requirement"));
            }
            requirements.push(parse_requirement(clause).map_err(|reason| error(&reason))?);
        }
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Names of the labelled resources this selector picks
    pub fn select<'a, I>(&self, resources: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, String>)>,
    {
        resources
            .into_iter()
            .filter(|(_, labels)| self.matches(labels))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

impl FromStr for Selector {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split on commas outside parentheses; `None` when parentheses don't balance
fn split_clauses(input: &str) -> Option<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                clauses.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    clauses.push(&input[start..]);
    Some(clauses)
}

fn parse_requirement(clause: &str) -> std::result::Result<Requirement, String> {
    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement::NotExists(parse_key(key)?));
    }
    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement::NotEquals(parse_key(key)?, parse_value(value)?));
    }
    if let Some((key, value)) = clause.split_once("==") {
        return Ok(Requirement::Equals(parse_key(key)?, parse_value(value)?));
    }
    if let Some((key, value)) = clause.split_once('=') {
        return Ok(Requirement::Equals(parse_key(key)?, parse_value(value)?));
    }

    let mut words = clause.splitn(2, char::is_whitespace);
    let key = words.next().unwrap_or_default();
    let rest = words.next().map(str::trim_start).unwrap_or_default();
    if rest.is_empty() {
        return Ok(Requirement::Exists(parse_key(key)?));
    }
    if let Some(set) = rest.strip_prefix("notin") {
        return Ok(Requirement::NotIn(parse_key(key)?, parse_set(set)?));
    }
    if let Some(set) = rest.strip_prefix("in") {
        return Ok(Requirement::In(parse_key(key)?, parse_set(set)?));
    }
    Err(format!("unexpected {:?} after key {:?}", rest, key))
}

fn parse_key(key: &str) -> std::result::Result<String, String> {
    let key = key.trim();
    if key.is_empty() {
        return Err("missing key".to_string());
    }
    if !key.chars().all(is_label_char) {
        return Err(format!("invalid key {:?}", key));
    }
    Ok(key.to_string())
}

fn parse_value(value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    if !value.chars().all(is_label_char) || value.contains('/') {
        return Err(format!("invalid value {:?}", value));
    }
    Ok(value.to_string())
}

fn parse_set(set: &str) -> std::result::Result<BTreeSet<String>, String> {
    let inner = set
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("expected a parenthesised set, got {:?}", set.trim()))?;
    if inner.trim().is_empty() {
        return Err("empty set".to_string());
    }
    inner
        .split(',')
        .map(|value| match parse_value(value)? {
            value if value.is_empty() => Err("empty value in set".to_string()),
            value => Ok(value),
        })
        .collect()
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality() {
        let prod = labels(&[("env", "prod")]);
        assert!(Selector::parse("env=prod").unwrap().matches(&prod));
        assert!(Selector::parse("env==prod").unwrap().matches(&prod));
        assert!(!Selector::parse("env!=prod").unwrap().matches(&prod));
        // absent keys satisfy inequality
        assert!(Selector::parse("tier!=web").unwrap().matches(&prod));
    }

    #[test]
    fn test_set_membership() {
        let selector = Selector::parse("env in (prod, staging),tier notin (db)").unwrap();
        assert_eq!(selector.requirements().len(), 2);
        assert!(selector.matches(&labels(&[("env", "staging"), ("tier", "web")])));
        assert!(selector.matches(&labels(&[("env", "prod")])));
        assert!(!selector.matches(&labels(&[("env", "prod"), ("tier", "db")])));
        assert!(!selector.matches(&labels(&[("env", "dev")])));
    }

    #[test]
    fn test_existence() {
        let selector = Selector::parse("env,!deprecated").unwrap();
        assert!(selector.matches(&labels(&[("env", "x")])));
        assert!(!selector.matches(&labels(&[("env", "x"), ("deprecated", "true")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_select_subset() {
        let a = labels(&[("env", "prod")]);
        let b = labels(&[("env", "dev")]);
        let c = labels(&[]);
        let selected = Selector::parse("env=prod")
            .unwrap()
            .select([("org-a", &a), ("org-b", &b), ("org-c", &c)]);
        assert_eq!(selected, BTreeSet::from(["org-a".to_string()]));
    }

    #[test]
    fn test_malformed_selectors() {
        for input in [
            "",
            "env=prod,",
            "env in (a",
            "env in a",
            "=prod",
            "env ~ prod",
            "env)",
            "env in ()",
            "env notin ( )",
            "env in (a,)",
        ] {
            assert!(
                matches!(Selector::parse(input), Err(HarnessError::Selector { .. })),
                "{:?} should be rejected",
                input
            );
        }
    }
}
