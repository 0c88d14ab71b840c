//! Fixtures shared by the git module tests.

use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::Arc;

use tempfile::TempDir;

use super::environment::{ActionEnvironment, ToolResolver};
use super::error::GitError;
use super::retry::RetryPolicy;
use super::runner::{GitCommandManager, GitCommandManagerBuilder};

pub fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Fresh repository on branch `main` with one empty commit `initial`.
pub fn make_git_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "--quiet"]);
    run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
    run_git(dir.path(), &["config", "tag.gpgsign", "false"]);
    run_git(dir.path(), &["commit", "--allow-empty", "--quiet", "-m", "initial"]);
    dir
}

pub fn commit_file(repo_dir: &Path, name: &str, contents: &str, message: &str) -> String {
    std::fs::write(repo_dir.join(name), contents).unwrap();
    run_git(repo_dir, &["add", name]);
    run_git(repo_dir, &["commit", "--quiet", "-m", message]);
    run_git(repo_dir, &["rev-parse", "HEAD"])
}

/// Retries immediately so failure-path tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, 0, 0, Some(0)).unwrap()
}

pub fn builder(path: &Path) -> GitCommandManagerBuilder {
    GitCommandManager::builder(path)
        .action_environment(ActionEnvironment::default())
        .retry_policy(fast_retry())
}

pub async fn manager(path: &Path) -> GitCommandManager {
    builder(path).build().await.unwrap()
}

#[derive(Debug, Clone)]
struct ShellTools {
    sh: PathBuf,
    has_lfs: bool,
}

impl ToolResolver for ShellTools {
    fn resolve(&self, tool: &str) -> Result<PathBuf, GitError> {
        match tool {
            "git" => Ok(self.sh.clone()),
            "git-lfs" if self.has_lfs => Ok(self.sh.clone()),
            _ => Err(GitError::ToolNotFound {
                tool: tool.to_string(),
            }),
        }
    }
}

/// Stands in for git with `sh`: the working directory holds `version` and
/// `lfs` scripts, so `git version` becomes `sh version` and
/// `git lfs version` becomes `sh lfs version`.
pub struct ShellResolver {
    dir: TempDir,
    tools: ShellTools,
}

impl ShellResolver {
    pub fn new(git_version: &str, lfs_version: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("version"), format!("echo '{git_version}'\n")).unwrap();
        if let Some(lfs) = lfs_version {
            std::fs::write(dir.path().join("lfs"), format!("echo '{lfs}'\n")).unwrap();
        }
        let sh = which::which("sh").unwrap();
        Self {
            dir,
            tools: ShellTools {
                sh,
                has_lfs: lfs_version.is_some(),
            },
        }
    }

    /// Adds or replaces a script; `git <name> args..` runs it with `args`.
    pub fn write_script(&self, name: &str, body: &str) {
        std::fs::write(self.dir.path().join(name), body).unwrap();
    }

    /// Lines a script appended to `<name>.calls`.
    pub fn calls(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join(format!("{name}.calls")))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn builder(&self) -> GitCommandManagerBuilder {
        GitCommandManager::builder(self.dir.path())
            .tool_resolver(Arc::new(self.tools.clone()))
            .action_environment(ActionEnvironment::default())
    }
}
