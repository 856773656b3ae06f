use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::AppConfig;
use crate::host::Host;

/// Dotted-numeric version such as `120.0.6099.129`.
///
/// Components compare numerically and missing trailing components count as
/// zero, so `10.10 > 10.9` and `1.0 == 1.0.0`.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    raw: String,
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let cleaned = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if cleaned.is_empty() {
            return Err(anyhow!("Empty version string"));
        }

        let parts = cleaned
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(anyhow!("Invalid version '{}': bad component '{}'", s, part));
                }
                part.parse::<u64>()
                    .map_err(|e| anyhow!("Invalid version '{}': {}", s, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            parts,
            raw: cleaned.to_string(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Parse a version string (with or without 'v' prefix)
pub fn parse_version(version_str: &str) -> Result<Version> {
    version_str.parse()
}

/// True when the available version is strictly newer than what is installed.
/// `None` means nothing is installed and sorts below every real version.
pub fn needs_update(installed: Option<&Version>, available: &Version) -> bool {
    // Option orders None before Some, which is exactly the sentinel we want
    installed < Some(available)
}

/// Version of the installed application, or `None` if it cannot be determined.
pub fn installed_version(app: &AppConfig, host: &dyn Host) -> Option<Version> {
    if !app.path.exists() {
        log::info!("{} is not installed", app.path.display());
        return None;
    }

    let raw = match host.read_bundle_value(&app.path, &app.version_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            log::warn!(
                "{} has no {} entry; treating as not installed",
                app.path.display(),
                app.version_key
            );
            return None;
        }
        Err(e) => {
            log::warn!("Failed to read installed version: {:#}", e);
            return None;
        }
    };

    match parse_version(&raw) {
        Ok(version) => Some(version),
        Err(e) => {
            log::warn!("Ignoring installed version: {:#}", e);
            None
        }
    }
}
