use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::error::GitError;

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").ok())
        .as_ref()
}

/// A dotted version with up to three numeric components.
///
/// Only the first `digits[.digits[.digits]]` run in the input is considered,
/// so `"git version 2.39.2"` parses as `2.39.2`. A version is valid iff the
/// major component parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GitVersion {
    major: Option<u32>,
    minor: Option<u32>,
    patch: Option<u32>,
}

impl GitVersion {
    /// Parses the first version-looking run in `input`. Never fails; check
    /// [`is_valid`](Self::is_valid) afterwards.
    pub fn parse(input: &str) -> Self {
        let Some(caps) = version_pattern().and_then(|p| p.captures(input)) else {
            return Self::default();
        };
        let component = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        let major = component(1);
        if major.is_none() {
            return Self::default();
        }
        let minor = component(2);
        // A patch without a minor cannot appear in the pattern, but a minor
        // that overflowed must not leave a dangling patch.
        let patch = minor.and(component(3));

        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.major.is_some()
    }

    /// Returns `true` if this version is at least `minimum`.
    ///
    /// Fails with `InvalidArgument` if `minimum` is not valid, whatever the
    /// receiver is. An invalid receiver never satisfies a minimum. Missing
    /// components compare as zero.
    pub fn check_minimum(&self, minimum: &GitVersion) -> Result<bool, GitError> {
        if !minimum.is_valid() {
            return Err(GitError::InvalidArgument(
                "minimum is not a valid version".to_string(),
            ));
        }
        if !self.is_valid() {
            return Ok(false);
        }

        let ours = [self.major, self.minor, self.patch];
        let theirs = [minimum.major, minimum.minor, minimum.patch];
        for (have, want) in ours.iter().zip(theirs.iter()) {
            let (have, want) = (have.unwrap_or(0), want.unwrap_or(0));
            if have < want {
                return Ok(false);
            }
            if have > want {
                return Ok(true);
            }
        }
        Ok(true)
    }
}

/// Renders exactly the parsed components (`"2"`, `"2.18"`, `"2.18.1"`), or
/// an empty string for an invalid version.
impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(major) = self.major else {
            return Ok(());
        };
        write!(f, "{major}")?;
        if let Some(minor) = self.minor {
            write!(f, ".{minor}")?;
            if let Some(patch) = self.patch {
                write!(f, ".{patch}")?;
            }
        }
        Ok(())
    }
}

impl From<&str> for GitVersion {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}
