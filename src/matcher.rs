//! Output patterns and polling primitives

use crate::error::{HarnessError, Result};
use regex::bytes::Regex;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing knobs shared by every expectation of a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    /// How long an `eventually` expectation may poll before failing
    pub eventually: Duration,
    /// Delay between two polls
    pub poll_interval: Duration,
    /// Window over which a `consistently` expectation must hold
    pub consistently: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            eventually: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
            consistently: Duration::from_secs(1),
        }
    }
}

impl Timeouts {
    pub fn with_eventually(mut self, eventually: Duration) -> Self {
        self.eventually = eventually;
        self
    }
}

/// A compiled output expectation.
///
/// Plain strings are treated as regular expressions, the way CLI
/// expectations are usually written (`org:\s+my-org`).
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| HarnessError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Match `text` verbatim
    pub fn literal(text: &str) -> Result<Self> {
        Self::regex(&regex::escape(text))
    }

    /// Build a regex from `template`, replacing each `{}` in order with a
    /// regex-escaped positional value.
    pub fn template(template: &str, values: &[&str]) -> Result<Self> {
        let pieces: Vec<&str> = template.split("{}").collect();
        if pieces.len() - 1 != values.len() {
            return Err(HarnessError::InvalidTemplate {
                template: template.to_string(),
                reason: format!(
                    "{} placeholders but {} values",
                    pieces.len() - 1,
                    values.len()
                ),
            });
        }

        let mut pattern = String::from(pieces[0]);
        for (value, piece) in values.iter().zip(&pieces[1..]) {
            pattern.push_str(&regex::escape(value));
            pattern.push_str(piece);
        }
        Self::regex(&pattern)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// End offset of the first match in `haystack`
    pub fn find_end(&self, haystack: &[u8]) -> Option<usize> {
        self.regex.find(haystack).map(|m| m.end())
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.regex.is_match(haystack)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Anything an expectation can be built from
pub trait IntoPattern {
    fn into_pattern(self) -> Result<Pattern>;
}

impl IntoPattern for Pattern {
    fn into_pattern(self) -> Result<Pattern> {
        Ok(self)
    }
}

impl IntoPattern for &Pattern {
    fn into_pattern(self) -> Result<Pattern> {
        Ok(self.clone())
    }
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::regex(self)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::regex(&self)
    }
}

impl IntoPattern for &String {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::regex(self)
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
///
/// The check runs at least once, even with a zero timeout.
pub async fn eventually<F>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}

/// Poll `check` over the whole `window`; false as soon as it fails once.
pub async fn consistently<F>(window: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + window;
    loop {
        if !check() {
            return false;
        }
        if Instant::now() >= deadline {
            return true;
        }
        sleep(interval).await;
    }
}
