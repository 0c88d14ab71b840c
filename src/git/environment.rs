use std::collections::BTreeMap;
use std::path::PathBuf;

use super::error::GitError;

pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Environment handed to every git invocation.
///
/// The inherited process environment is snapshotted once at construction
/// and only re-read through [`refresh_inherited`](Self::refresh_inherited).
/// Overlay entries win over inherited ones with the same name.
#[derive(Debug, Clone)]
pub struct GitEnvironment {
    inherited: BTreeMap<String, String>,
    overlay: BTreeMap<String, String>,
}

impl GitEnvironment {
    /// Snapshots the current process environment. The overlay starts with
    /// interactive credential prompting disabled.
    pub fn capture() -> Self {
        Self::with_inherited(Self::process_vars())
    }

    /// Builds an environment over an explicit inherited snapshot.
    pub fn with_inherited(inherited: BTreeMap<String, String>) -> Self {
        let mut overlay = BTreeMap::new();
        overlay.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        overlay.insert("GCM_INTERACTIVE".to_string(), "Never".to_string());
        Self { inherited, overlay }
    }

    fn process_vars() -> BTreeMap<String, String> {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn refresh_inherited(&mut self) {
        self.inherited = Self::process_vars();
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.overlay.insert(name.into(), value.into());
    }

    /// Removes an overlay entry. Inherited values are untouched.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.overlay.remove(name)
    }

    pub fn overlay(&self) -> &BTreeMap<String, String> {
        &self.overlay
    }

    /// Effective value of `name` after layering.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.overlay
            .get(name)
            .or_else(|| self.inherited.get(name))
            .map(String::as_str)
    }

    /// Inherited variables merged with the overlay.
    pub fn merged(&self) -> BTreeMap<&str, &str> {
        let mut env: BTreeMap<&str, &str> = self
            .inherited
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        env.extend(self.overlay.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        env
    }
}

/// Locates executables by name.
pub trait ToolResolver: Send + Sync {
    /// Returns the absolute path of `tool`, failing if it is absent.
    fn resolve(&self, tool: &str) -> Result<PathBuf, GitError>;
}

/// Resolves executables on `$PATH` via the `which` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl ToolResolver for PathResolver {
    fn resolve(&self, tool: &str) -> Result<PathBuf, GitError> {
        which::which(tool).map_err(|_| GitError::ToolNotFound {
            tool: tool.to_string(),
        })
    }
}

/// Ambient values supplied by the hosting CI system, read once.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ActionEnvironment {
    /// Base URL of the hosting server (`GITHUB_SERVER_URL`).
    pub server_url: String,
    /// Ref that triggered the run (`GITHUB_REF`), e.g. `refs/pull/7/merge`.
    pub ref_hint: Option<String>,
}

impl Default for ActionEnvironment {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ref_hint: None,
        }
    }
}

impl ActionEnvironment {
    pub fn from_env() -> Self {
        let server_url = std::env::var("GITHUB_SERVER_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let ref_hint = std::env::var("GITHUB_REF")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Self {
            server_url,
            ref_hint,
        }
    }

    /// Number-and-suffix part of a pull-request ref hint
    /// (`refs/pull/7/merge` yields `7/merge`).
    pub fn pull_request_ref(&self) -> Option<&str> {
        let hint = self.ref_hint.as_deref()?;
        let prefix = "refs/pull/";
        let head = hint.get(..prefix.len())?;
        if head.eq_ignore_ascii_case(prefix) && hint.len() > prefix.len() {
            Some(&hint[prefix.len()..])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overlay_wins_over_inherited() {
        let mut env = GitEnvironment::with_inherited(snapshot(&[
            ("PATH", "/usr/bin"),
            ("GIT_TERMINAL_PROMPT", "1"),
        ]));
        env.set("GIT_LFS_SKIP_SMUDGE", "1");

        let merged = env.merged();
        assert_eq!(merged.get("PATH"), Some(&"/usr/bin"));
        assert_eq!(merged.get("GIT_TERMINAL_PROMPT"), Some(&"0"));
        assert_eq!(merged.get("GCM_INTERACTIVE"), Some(&"Never"));
        assert_eq!(merged.get("GIT_LFS_SKIP_SMUDGE"), Some(&"1"));
    }

    #[test]
    fn test_remove_reveals_inherited_value() {
        let mut env = GitEnvironment::with_inherited(snapshot(&[("GIT_TERMINAL_PROMPT", "1")]));
        assert_eq!(env.get("GIT_TERMINAL_PROMPT"), Some("0"));
        assert_eq!(env.remove("GIT_TERMINAL_PROMPT").as_deref(), Some("0"));
        assert_eq!(env.get("GIT_TERMINAL_PROMPT"), Some("1"));
        assert_eq!(env.remove("MISSING"), None);
    }

    #[test]
    fn test_path_resolver_missing_tool() {
        let err = PathResolver
            .resolve("definitely-not-a-real-tool-4f1c")
            .unwrap_err();
        assert!(matches!(err, GitError::ToolNotFound { tool } if tool == "definitely-not-a-real-tool-4f1c"));
    }

    #[test]
    fn test_pull_request_ref() {
        let env = ActionEnvironment {
            ref_hint: Some("refs/pull/42/merge".into()),
            ..Default::default()
        };
        assert_eq!(env.pull_request_ref(), Some("42/merge"));

        let env = ActionEnvironment {
            ref_hint: Some("refs/heads/main".into()),
            ..Default::default()
        };
        assert_eq!(env.pull_request_ref(), None);
        assert_eq!(ActionEnvironment::default().pull_request_ref(), None);
    }
}
