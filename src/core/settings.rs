use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::git::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SECONDS, DEFAULT_MIN_SECONDS};
use crate::git::{ActionEnvironment, GitError, RetryPolicy};

const PREFIX: &str = "CHECKOUT_";

/// Whether and how deep submodules are checked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmoduleMode {
    #[default]
    Disabled,
    Enabled,
    Recursive,
}

impl SubmoduleMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn is_recursive(self) -> bool {
        matches!(self, Self::Recursive)
    }
}

/// Inputs for one checkout run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSettings {
    pub repository_url: String,
    pub path: PathBuf,
    /// Branch, tag or full ref; empty means the remote's default branch
    /// unless `commit` is set.
    pub reference: String,
    pub commit: String,
    /// 0 fetches all history.
    pub fetch_depth: u32,
    pub fetch_tags: bool,
    pub filter: Option<String>,
    pub show_progress: bool,
    pub lfs: bool,
    pub submodules: SubmoduleMode,
    pub sparse_checkout: Vec<String>,
    pub sparse_checkout_cone_mode: bool,
    pub clean: bool,
    pub retry: RetryPolicy,
    pub action: ActionEnvironment,
}

impl CheckoutSettings {
    /// Settings with every optional input at its default.
    pub fn new(repository_url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repository_url: repository_url.into(),
            path: path.into(),
            reference: String::new(),
            commit: String::new(),
            fetch_depth: 1,
            fetch_tags: false,
            filter: None,
            show_progress: true,
            lfs: false,
            submodules: SubmoduleMode::Disabled,
            sparse_checkout: Vec::new(),
            sparse_checkout_cone_mode: true,
            clean: true,
            retry: RetryPolicy::default(),
            action: ActionEnvironment::default(),
        }
    }

    /// Reads `CHECKOUT_*` variables (plus `GITHUB_*` fallbacks) from the
    /// process environment.
    ///
    /// `GITHUB_REF`/`GITHUB_SHA` stand in for a missing ref only when the
    /// repository is `GITHUB_REPOSITORY`. With `GITHUB_WORKSPACE` set, the
    /// path is resolved against it and must stay inside it.
    pub fn from_env() -> Result<Self, GitError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let input = |name: &str| get(&format!("{PREFIX}{name}"));

        let action = ActionEnvironment {
            server_url: get("GITHUB_SERVER_URL")
                .unwrap_or_else(|| crate::git::environment::DEFAULT_SERVER_URL.to_string()),
            ref_hint: get("GITHUB_REF"),
        };

        let repository = input("REPOSITORY").ok_or_else(|| GitError::InvalidSetting {
            name: format!("{PREFIX}REPOSITORY"),
            value: String::new(),
        })?;
        let url = repository_url(repository.trim(), &action.server_url);

        let cwd = std::env::current_dir()?;
        let workspace = get("GITHUB_WORKSPACE").map(|w| normalize(&cwd.join(w.trim())));
        let base = workspace.clone().unwrap_or(cwd);
        let path = match input("PATH") {
            Some(p) => {
                let path = normalize(&base.join(p.trim()));
                if let Some(workspace) = &workspace {
                    if !path.starts_with(workspace) {
                        return Err(invalid("PATH", &p));
                    }
                }
                path
            }
            None => base,
        };

        // The trigger's ref and sha only describe the workflow's own repository.
        let is_workflow_repository = get("GITHUB_REPOSITORY").is_some_and(|own| {
            repository_url(own.trim(), &action.server_url).eq_ignore_ascii_case(&url)
        });

        let mut settings = Self::new(url, path);
        settings.commit = input("COMMIT").unwrap_or_default();
        match input("REF") {
            Some(reference) => settings.reference = reference,
            None if is_workflow_repository => {
                settings.reference = get("GITHUB_REF").unwrap_or_default();
                if settings.commit.is_empty() {
                    settings.commit = get("GITHUB_SHA").unwrap_or_default();
                }
            }
            None => {}
        }

        if let Some(v) = input("FETCH_DEPTH") {
            settings.fetch_depth = parse_number("FETCH_DEPTH", &v)?;
        }
        if let Some(v) = input("FETCH_TAGS") {
            settings.fetch_tags = parse_bool("FETCH_TAGS", &v)?;
        }
        settings.filter = input("FILTER").map(|f| f.trim().to_string());
        if let Some(v) = input("SHOW_PROGRESS") {
            settings.show_progress = parse_bool("SHOW_PROGRESS", &v)?;
        }
        if let Some(v) = input("LFS") {
            settings.lfs = parse_bool("LFS", &v)?;
        }
        if let Some(v) = input("SUBMODULES") {
            settings.submodules = parse_submodules(&v)?;
        }
        if let Some(v) = input("SPARSE_CHECKOUT") {
            settings.sparse_checkout = v
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = input("SPARSE_CHECKOUT_CONE_MODE") {
            settings.sparse_checkout_cone_mode = parse_bool("SPARSE_CHECKOUT_CONE_MODE", &v)?;
        }
        if let Some(v) = input("CLEAN") {
            settings.clean = parse_bool("CLEAN", &v)?;
        }

        let max_attempts = match input("RETRY_MAX_ATTEMPTS") {
            Some(v) => parse_number("RETRY_MAX_ATTEMPTS", &v)?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let min_seconds = match input("RETRY_MIN_SECONDS") {
            Some(v) => parse_number("RETRY_MIN_SECONDS", &v)?,
            None => DEFAULT_MIN_SECONDS,
        };
        let max_seconds = match input("RETRY_MAX_SECONDS") {
            Some(v) => parse_number("RETRY_MAX_SECONDS", &v)?,
            None => DEFAULT_MAX_SECONDS,
        };
        let interval = input("RETRY_INTERVAL_SECONDS")
            .map(|v| parse_number("RETRY_INTERVAL_SECONDS", &v))
            .transpose()?;
        settings.retry = RetryPolicy::new(max_attempts, min_seconds, max_seconds, interval)?;

        settings.action = action;
        Ok(settings)
    }
}

/// Expands an `owner/repo` shorthand against the server URL. Anything else
/// (full URLs, scp-style remotes, local paths) is used verbatim.
fn repository_url(repository: &str, server_url: &str) -> String {
    let mut parts = repository.split('/');
    let is_shorthand = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    ) && !repository.contains(':')
        && !repository.starts_with('.');

    if is_shorthand {
        format!("{}/{repository}", server_url.trim_end_matches('/'))
    } else {
        repository.to_string()
    }
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn invalid(name: &str, value: &str) -> GitError {
    GitError::InvalidSetting {
        name: format!("{PREFIX}{name}"),
        value: value.to_string(),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, GitError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GitError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_submodules(value: &str) -> Result<SubmoduleMode, GitError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "false" => Ok(SubmoduleMode::Disabled),
        "true" => Ok(SubmoduleMode::Enabled),
        "recursive" => Ok(SubmoduleMode::Recursive),
        _ => Err(invalid("SUBMODULES", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings =
            CheckoutSettings::from_lookup(lookup(&[("CHECKOUT_REPOSITORY", "actions/checkout")]))
                .unwrap();

        assert_eq!(settings.repository_url, "https://github.com/actions/checkout");
        assert_eq!(settings.path, std::env::current_dir().unwrap());
        assert_eq!(settings.reference, "");
        assert_eq!(settings.fetch_depth, 1);
        assert!(settings.show_progress);
        assert!(settings.clean);
        assert!(settings.sparse_checkout_cone_mode);
        assert_eq!(settings.submodules, SubmoduleMode::Disabled);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_repository_is_required() {
        let err = CheckoutSettings::from_lookup(lookup(&[("CHECKOUT_REPOSITORY", "  ")])).unwrap_err();
        assert!(matches!(err, GitError::InvalidSetting { name, .. } if name == "CHECKOUT_REPOSITORY"));
    }

    #[test]
    fn test_github_fallbacks_and_enterprise_server() {
        let settings = CheckoutSettings::from_lookup(lookup(&[
            ("CHECKOUT_REPOSITORY", "team/tool"),
            ("GITHUB_REPOSITORY", "Team/Tool"),
            ("GITHUB_SERVER_URL", "https://ghe.example.com/"),
            ("GITHUB_REF", "refs/pull/7/merge"),
            ("GITHUB_SHA", "abc123"),
        ]))
        .unwrap();

        assert_eq!(settings.repository_url, "https://ghe.example.com/team/tool");
        assert_eq!(settings.reference, "refs/pull/7/merge");
        assert_eq!(settings.commit, "abc123");
        assert_eq!(settings.action.pull_request_ref(), Some("7/merge"));
    }

    #[test]
    fn test_other_repository_ignores_trigger_ref() {
        let settings = CheckoutSettings::from_lookup(lookup(&[
            ("CHECKOUT_REPOSITORY", "other/tool"),
            ("GITHUB_REPOSITORY", "me/mine"),
            ("GITHUB_REF", "refs/heads/main"),
            ("GITHUB_SHA", "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"),
        ]))
        .unwrap();

        assert_eq!(settings.repository_url, "https://github.com/other/tool");
        assert_eq!(settings.reference, "");
        assert_eq!(settings.commit, "");
    }

    #[test]
    fn test_explicit_ref_skips_trigger_sha() {
        let settings = CheckoutSettings::from_lookup(lookup(&[
            ("CHECKOUT_REPOSITORY", "me/mine"),
            ("CHECKOUT_REF", "release"),
            ("GITHUB_REPOSITORY", "me/mine"),
            ("GITHUB_SHA", "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"),
        ]))
        .unwrap();

        assert_eq!(settings.reference, "release");
        assert_eq!(settings.commit, "");
    }

    #[test]
    fn test_path_stays_inside_workspace() {
        let workspace = std::env::temp_dir().join("checkout-workspace");
        let ws = workspace.to_string_lossy().to_string();
        let with_path = |path: Option<&str>| {
            let mut vars = vec![("CHECKOUT_REPOSITORY", "owner/repo"), ("GITHUB_WORKSPACE", ws.as_str())];
            if let Some(p) = path {
                vars.push(("CHECKOUT_PATH", p));
            }
            CheckoutSettings::from_lookup(lookup(&vars))
        };

        assert_eq!(with_path(None).unwrap().path, workspace);
        assert_eq!(with_path(Some("sub/dir")).unwrap().path, workspace.join("sub").join("dir"));
        assert_eq!(with_path(Some("./a/../b")).unwrap().path, workspace.join("b"));

        for escape in ["/etc", "../escape", "sub/../../escape"] {
            let err = with_path(Some(escape)).unwrap_err();
            assert!(
                matches!(&err, GitError::InvalidSetting { name, value } if name == "CHECKOUT_PATH" && value == escape),
                "{escape}: {err:?}"
            );
        }
    }

    #[test]
    fn test_full_urls_and_paths_are_verbatim() {
        for repo in [
            "https://gitlab.com/owner/repo.git",
            "git@github.com:owner/repo.git",
            "/srv/git/repo",
            "./owner/repo",
        ] {
            assert_eq!(repository_url(repo, "https://github.com"), repo);
        }
    }

    #[test]
    fn test_explicit_inputs() {
        let settings = CheckoutSettings::from_lookup(lookup(&[
            ("CHECKOUT_REPOSITORY", "owner/repo"),
            ("CHECKOUT_PATH", "sub/dir"),
            ("CHECKOUT_REF", "release"),
            ("CHECKOUT_FETCH_DEPTH", "0"),
            ("CHECKOUT_FETCH_TAGS", "TRUE"),
            ("CHECKOUT_FILTER", "blob:none"),
            ("CHECKOUT_LFS", "true"),
            ("CHECKOUT_SUBMODULES", "Recursive"),
            ("CHECKOUT_SPARSE_CHECKOUT", "src\n\n  docs  \n"),
            ("CHECKOUT_SPARSE_CHECKOUT_CONE_MODE", "false"),
            ("CHECKOUT_CLEAN", "false"),
            ("CHECKOUT_RETRY_MAX_ATTEMPTS", "5"),
            ("CHECKOUT_RETRY_MIN_SECONDS", "1"),
            ("CHECKOUT_RETRY_MAX_SECONDS", "2"),
            ("CHECKOUT_RETRY_INTERVAL_SECONDS", "3"),
        ]))
        .unwrap();

        assert!(settings.path.ends_with("sub/dir"));
        assert_eq!(settings.reference, "release");
        assert_eq!(settings.fetch_depth, 0);
        assert!(settings.fetch_tags);
        assert_eq!(settings.filter.as_deref(), Some("blob:none"));
        assert!(settings.lfs);
        assert_eq!(settings.submodules, SubmoduleMode::Recursive);
        assert_eq!(settings.sparse_checkout, vec!["src".to_string(), "docs".to_string()]);
        assert!(!settings.sparse_checkout_cone_mode);
        assert!(!settings.clean);
        assert_eq!(settings.retry, RetryPolicy::new(5, 1, 2, Some(3)).unwrap());
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("CHECKOUT_FETCH_DEPTH", "-1"),
            ("CHECKOUT_CLEAN", "yes"),
            ("CHECKOUT_SUBMODULES", "deep"),
            ("CHECKOUT_RETRY_INTERVAL_SECONDS", "soon"),
        ];
        for (name, value) in cases {
            let err = CheckoutSettings::from_lookup(lookup(&[
                ("CHECKOUT_REPOSITORY", "owner/repo"),
                (name, value),
            ]))
            .unwrap_err();
            assert!(
                matches!(&err, GitError::InvalidSetting { name: n, value: v } if n == name && v == value),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn test_inverted_retry_bounds() {
        let err = CheckoutSettings::from_lookup(lookup(&[
            ("CHECKOUT_REPOSITORY", "owner/repo"),
            ("CHECKOUT_RETRY_MIN_SECONDS", "30"),
            ("CHECKOUT_RETRY_MAX_SECONDS", "5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, GitError::InvalidRetryBounds { min: 30, max: 5 }));
    }
}
