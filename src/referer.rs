//! # Referer Gate
//!
//! Hot-linking protection. Requests whose `Referer` matches none of the
//! configured patterns are redirected (301) to the upstream URL itself, so
//! the browser loads the original instead of burning proxy bandwidth.
//!
//! An empty pattern list allows everything, and so does a missing referer
//! (direct visits, privacy-stripped requests).

use regex::Regex;

use crate::error::EspejoError;

/// What to do with a request after checking its referer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefererDecision {
    /// Serve the request.
    Allow,
    /// 301 to the bare upstream URL.
    Redirect,
}

/// Compiled referer allow-list.
#[derive(Debug)]
pub struct RefererGate {
    patterns: Vec<Regex>,
}

impl RefererGate {
    /// Compile the configured patterns. Fails fast on an invalid regex so a
    /// typo is caught at startup, not at request time.
    pub fn new(patterns: &[String]) -> Result<Self, EspejoError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| EspejoError::Config(format!("Bad referer pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Check a request's referer header value.
    pub fn check(&self, referer: Option<&str>) -> RefererDecision {
        if self.patterns.is_empty() {
            return RefererDecision::Allow;
        }
        let Some(referer) = referer else {
            return RefererDecision::Allow;
        };
        if self.patterns.iter().any(|p| p.is_match(referer)) {
            RefererDecision::Allow
        } else {
            RefererDecision::Redirect
        }
    }
}
