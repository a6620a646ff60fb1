//! Exact-version package pins

use crate::error::{ProvisionError, ProvisionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Packages installed into the project environment by default
pub const DEFAULT_PINS: &[&str] = &[
    "mamba==0.17.0",
    "snakemake-minimal==6.12.3",
    "jinja2==2.11.3",
];

/// A package pinned to one exact version (`name==version`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackagePin {
    name: String,
    version: String,
}

impl PackagePin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The default pin set
    pub fn defaults() -> Vec<PackagePin> {
        DEFAULT_PINS
            .iter()
            .filter_map(|spec| spec.parse().ok())
            .collect()
    }
}

impl FromStr for PackagePin {
    type Err = ProvisionError;

    fn from_str(spec: &str) -> ProvisionResult<Self> {
        let invalid = |reason: &str| ProvisionError::InvalidPackagePin {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let (name, version) = spec
            .trim()
            .split_once("==")
            .ok_or_else(|| invalid("expected name==version"))?;

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("package name may only contain letters, digits, '-', '_' and '.'"));
        }

        if version.is_empty() {
            return Err(invalid("version is empty"));
        }
        if version
            .chars()
            .any(|c| matches!(c, '<' | '>' | '=' | '!' | '~' | '*' | ',' | '|' | ' '))
        {
            return Err(invalid("version ranges are not allowed, pin one exact version"));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl TryFrom<String> for PackagePin {
    type Error = ProvisionError;

    fn try_from(spec: String) -> ProvisionResult<Self> {
        spec.parse()
    }
}

impl From<PackagePin> for String {
    fn from(pin: PackagePin) -> Self {
        pin.to_string()
    }
}

impl fmt::Display for PackagePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// Render pins as one line per package, in order
pub fn pin_list(pins: &[PackagePin]) -> String {
    pins.iter().map(|p| format!("{}\n", p)).collect()
}
