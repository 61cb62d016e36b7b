//! PV selection
//!
//! Include and exclude patterns are regular expressions anchored at the
//! start of the PV name (`SR:` matches `SR:C01:Current` but not
//! `XSR:Current`). A PV is selected when it matches at least one include
//! pattern and no exclude pattern.

use crate::archive::{Archive, ValueKind};
use crate::error::{ArchiveResult, ConfigError};
use regex::Regex;
use tracing::{debug, trace};

/// Include pattern used when none is given
pub const DEFAULT_INCLUDE: &str = ".*";

/// Compiled include/exclude filter over PV names
#[derive(Debug, Clone)]
pub struct PvSelector {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PvSelector {
    /// Compile include and exclude patterns
    ///
    /// An empty include list selects everything.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let include = if include.is_empty() {
            vec![compile("include", DEFAULT_INCLUDE)?]
        } else {
            include
                .iter()
                .map(|p| compile("include", p))
                .collect::<Result<Vec<_>, _>>()?
        };

        let exclude = exclude
            .iter()
            .map(|p| compile("exclude", p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { include, exclude })
    }

    /// Check if a PV name passes the filter
    pub fn matches(&self, pv_name: &str) -> bool {
        self.include.iter().any(|re| re.is_match(pv_name))
            && !self.exclude.iter().any(|re| re.is_match(pv_name))
    }

    /// Select the exportable PVs of an archive
    ///
    /// Names are returned in archive order. Text-valued PVs are dropped
    /// here; the value kind is only looked up for names passing the filter.
    pub fn select<A: Archive>(&self, archive: &A) -> ArchiveResult<Vec<String>> {
        let mut selected = Vec::new();

        for pv_name in archive.pv_names()? {
            if !self.matches(&pv_name) {
                trace!(pv = %pv_name, "PV filtered out");
                continue;
            }

            match archive.value_kind(&pv_name)? {
                ValueKind::Text => debug!(pv = %pv_name, "Text-valued PV not selected"),
                _ => selected.push(pv_name),
            }
        }

        Ok(selected)
    }
}

fn compile(kind: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| ConfigError::InvalidPattern {
        kind,
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(include: &[&str], exclude: &[&str]) -> PvSelector {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        PvSelector::new(&include, &exclude).unwrap()
    }

    #[test]
    fn test_default_selects_everything() {
        let s = selector(&[], &[]);
        assert!(s.matches("SR:C01:Current"));
        assert!(s.matches(""));
    }

    #[test]
    fn test_include_is_prefix_anchored() {
        let s = selector(&["SR:"], &[]);
        assert!(s.matches("SR:C01:Current"));
        assert!(!s.matches("XSR:Current"));
        assert!(!s.matches("BR:SR:Current"));
    }

    #[test]
    fn test_exclude_wins() {
        let s = selector(&["SR:"], &["SR:C01"]);
        assert!(s.matches("SR:C02:Current"));
        assert!(!s.matches("SR:C01:Current"));
    }

    #[test]
    fn test_alternation_anchored_as_group() {
        let s = selector(&["SR|BR"], &[]);
        assert!(s.matches("BR:Energy"));
        assert!(!s.matches("LI:BR"));
    }

    #[test]
    fn test_exclude_only() {
        let s = selector(&[], &[".*:Spare"]);
        assert!(s.matches("SR:C01:Current"));
        assert!(!s.matches("SR:C01:Spare"));
    }

    #[test]
    fn test_invalid_include() {
        let err = PvSelector::new(&["[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { kind: "include", .. }));
    }
}
