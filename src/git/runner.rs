use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::environment::{ActionEnvironment, GitEnvironment, PathResolver, ToolResolver};
use super::error::GitError;
use super::output::{GitExecOutput, OutputListener};
use super::retry::{RetryHelper, RetryPolicy};
use super::version::GitVersion;

/// Authenticated HTTP headers and protocol v2 are unsupported below this.
pub const MINIMUM_GIT_VERSION: &str = "2.18";
/// Auth headers are unsupported below this.
pub const MINIMUM_GIT_LFS_VERSION: &str = "2.1";
/// `git sparse-checkout` does not exist below this.
pub const MINIMUM_GIT_SPARSE_CHECKOUT_VERSION: &str = "2.28";

const USER_AGENT_PRODUCT: &str = "git-checkout";

/// Per-invocation exit-code and logging policy.
///
/// By default any non-zero exit is a `CommandFailed` error. Operations that
/// encode an answer in the exit code (e.g. `diff --quiet` returning 1) opt
/// into `allow_all_exit_codes` and inspect the code themselves. `silent`
/// demotes the command's output from info to debug logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub allow_all_exit_codes: bool,
    pub silent: bool,
}

impl ExecOptions {
    pub fn allow_all_exit_codes(mut self) -> Self {
        self.allow_all_exit_codes = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Stdout,
    Stderr,
}

/// Git command runner bound to one working directory.
///
/// Only obtainable through [`GitCommandManagerBuilder::build`], which
/// resolves the executable and enforces the minimum versions, so every
/// operation runs against a gated tool. Commands run one at a time via
/// `tokio::process::Command` with the working directory as cwd and the
/// layered [`GitEnvironment`]. Subprocesses are killed on drop.
#[derive(Debug, Clone)]
pub struct GitCommandManager {
    pub(super) working_directory: PathBuf,
    pub(super) git_path: PathBuf,
    pub(super) env: GitEnvironment,
    pub(super) lfs: bool,
    pub(super) sparse_checkout: bool,
    pub(super) retry: RetryHelper,
    pub(super) version: GitVersion,
    pub(super) action_env: ActionEnvironment,
}

/// Collects the options for a [`GitCommandManager`].
pub struct GitCommandManagerBuilder {
    working_directory: PathBuf,
    lfs: bool,
    sparse_checkout: bool,
    retry_policy: RetryPolicy,
    resolver: Arc<dyn ToolResolver>,
    action_env: Option<ActionEnvironment>,
    environment: Option<GitEnvironment>,
}

impl GitCommandManagerBuilder {
    pub fn lfs(mut self, enabled: bool) -> Self {
        self.lfs = enabled;
        self
    }

    pub fn sparse_checkout(mut self, enabled: bool) -> Self {
        self.sparse_checkout = enabled;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn tool_resolver(mut self, resolver: Arc<dyn ToolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Overrides the ambient server URL / ref hint, which otherwise are
    /// read from the process environment.
    pub fn action_environment(mut self, action_env: ActionEnvironment) -> Self {
        self.action_env = Some(action_env);
        self
    }

    /// Overrides the inherited-environment snapshot.
    pub fn environment(mut self, environment: GitEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Resolves git, gates its version (and git-lfs / sparse-checkout
    /// requirements when requested) and installs the HTTP user agent.
    ///
    /// Fails fast with no retry.
    pub async fn build(self) -> Result<GitCommandManager, GitError> {
        let git_path = self.resolver.resolve("git")?;

        let mut manager = GitCommandManager {
            working_directory: self.working_directory,
            git_path,
            env: self.environment.unwrap_or_else(GitEnvironment::capture),
            lfs: self.lfs,
            sparse_checkout: self.sparse_checkout,
            retry: RetryHelper::new(self.retry_policy),
            version: GitVersion::default(),
            action_env: self.action_env.unwrap_or_else(ActionEnvironment::from_env),
        };

        log::debug!("Getting git version");
        let version = manager.probe_version(&["version"], "git").await?;
        let minimum = GitVersion::parse(MINIMUM_GIT_VERSION);
        if !version.check_minimum(&minimum)? {
            return Err(GitError::UnsupportedVersion {
                requirement: "required git".to_string(),
                tool: "git".to_string(),
                path: manager.git_path.clone(),
                minimum: minimum.to_string(),
                found: version.to_string(),
            });
        }
        manager.version = version;

        if manager.lfs {
            log::debug!("Getting git-lfs version");
            let lfs_path = self.resolver.resolve("git-lfs")?;
            let lfs_version = manager.probe_version(&["lfs", "version"], "git-lfs").await?;
            let minimum = GitVersion::parse(MINIMUM_GIT_LFS_VERSION);
            if !lfs_version.check_minimum(&minimum)? {
                return Err(GitError::UnsupportedVersion {
                    requirement: "required git-lfs".to_string(),
                    tool: "git-lfs".to_string(),
                    path: lfs_path,
                    minimum: minimum.to_string(),
                    found: lfs_version.to_string(),
                });
            }
        } else {
            // git-lfs pulls content whenever any config level enables it;
            // keep the smudge filter quiet unless LFS was asked for.
            manager.env.set("GIT_LFS_SKIP_SMUDGE", "1");
        }

        if manager.sparse_checkout {
            let minimum = GitVersion::parse(MINIMUM_GIT_SPARSE_CHECKOUT_VERSION);
            if !version.check_minimum(&minimum)? {
                return Err(GitError::UnsupportedVersion {
                    requirement: "git required for sparse checkout".to_string(),
                    tool: "git".to_string(),
                    path: manager.git_path.clone(),
                    minimum: minimum.to_string(),
                    found: version.to_string(),
                });
            }
        }

        let user_agent = format!("git/{version} ({USER_AGENT_PRODUCT})");
        log::debug!("Set git useragent to: {user_agent}");
        manager.env.set("GIT_HTTP_USER_AGENT", user_agent);

        Ok(manager)
    }
}

impl GitCommandManager {
    /// Starts configuring a manager for `working_directory`.
    pub fn builder(working_directory: impl Into<PathBuf>) -> GitCommandManagerBuilder {
        GitCommandManagerBuilder {
            working_directory: working_directory.into(),
            lfs: false,
            sparse_checkout: false,
            retry_policy: RetryPolicy::default(),
            resolver: Arc::new(PathResolver),
            action_env: None,
            environment: None,
        }
    }

    /// Runs a version subcommand and parses its single-line output.
    async fn probe_version(&self, args: &[&str], tool: &str) -> Result<GitVersion, GitError> {
        let output = self.exec_git(args, ExecOptions::default()).await?;
        let stdout = output.trimmed();
        let version = if stdout.contains('\n') {
            GitVersion::default()
        } else {
            GitVersion::parse(&stdout)
        };
        if !version.is_valid() {
            return Err(GitError::VersionUndetermined {
                tool: tool.to_string(),
            });
        }
        Ok(version)
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn version(&self) -> GitVersion {
        self.version
    }

    pub fn lfs_enabled(&self) -> bool {
        self.lfs
    }

    pub fn sparse_checkout_enabled(&self) -> bool {
        self.sparse_checkout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    pub fn action_environment(&self) -> &ActionEnvironment {
        &self.action_env
    }

    pub fn environment(&self) -> &GitEnvironment {
        &self.env
    }

    pub fn set_environment_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env.set(name, value);
    }

    pub fn remove_environment_variable(&mut self, name: &str) {
        self.env.remove(name);
    }

    /// Re-snapshots the inherited process environment.
    pub fn refresh_environment(&mut self) {
        self.env.refresh_inherited();
    }

    /// Executes a git subcommand and returns its captured output.
    ///
    /// Returns `WorkingDirectoryNotFound` if the working directory is gone,
    /// `ToolNotFound`/`SpawnError` if the process cannot start, `Killed` on
    /// signal termination, and `CommandFailed` for non-zero exit codes
    /// unless `options.allow_all_exit_codes` is set.
    pub async fn exec_git(
        &self,
        args: &[&str],
        options: ExecOptions,
    ) -> Result<GitExecOutput, GitError> {
        self.exec_git_with_listener(args, options, None).await
    }

    /// Like [`exec_git`](Self::exec_git), additionally forwarding every
    /// line and the exit code to `listener`.
    pub async fn exec_git_with_listener(
        &self,
        args: &[&str],
        options: ExecOptions,
        mut listener: Option<&mut dyn OutputListener>,
    ) -> Result<GitExecOutput, GitError> {
        let is_dir = tokio::fs::metadata(&self.working_directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(GitError::WorkingDirectoryNotFound {
                path: self.working_directory.clone(),
            });
        }

        let command_str = format!("{} {}", self.git_path.display(), args.join(" "));
        let mut result = GitExecOutput::new();

        let command_line = format!("[command]{command_str}");
        if options.silent {
            log::debug!("{command_line}");
        } else {
            log::info!("{command_line}");
        }
        if let Some(l) = listener.as_deref_mut() {
            l.on_debug(&command_line);
        }
        result.add_debug_line(command_line);

        let mut cmd = Command::new(&self.git_path);
        cmd.args(args)
            .current_dir(&self.working_directory)
            .env_clear()
            .envs(self.env.merged())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                GitError::ToolNotFound {
                    tool: self.git_path.display().to_string(),
                }
            } else {
                GitError::SpawnError {
                    source,
                    command: command_str.clone(),
                }
            }
        })?;

        let pipe_error = |what: &str| GitError::SpawnError {
            source: std::io::Error::other(format!("{what} was not captured")),
            command: command_str.clone(),
        };
        let stdout = child.stdout.take().ok_or_else(|| pipe_error("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| pipe_error("stderr"))?;

        let mut stdout = BufReader::new(stdout).split(b'\n');
        let mut stderr = BufReader::new(stderr).split(b'\n');
        let (mut stdout_open, mut stderr_open) = (true, true);

        let read_error = |source: std::io::Error| GitError::SpawnError {
            source,
            command: command_str.clone(),
        };

        while stdout_open || stderr_open {
            tokio::select! {
                segment = stdout.next_segment(), if stdout_open => match segment.map_err(read_error)? {
                    Some(bytes) => record(&mut result, &mut listener, Channel::Stdout, &bytes, options.silent),
                    None => stdout_open = false,
                },
                segment = stderr.next_segment(), if stderr_open => match segment.map_err(read_error)? {
                    Some(bytes) => record(&mut result, &mut listener, Channel::Stderr, &bytes, options.silent),
                    None => stderr_open = false,
                },
            }
        }

        let status = child.wait().await.map_err(read_error)?;
        let Some(code) = status.code() else {
            return Err(GitError::Killed {
                command: command_str,
            });
        };
        result.set_exit_code(code);
        if let Some(l) = listener.as_deref_mut() {
            l.on_exit(code);
        }

        log::debug!("{code}");
        log::debug!("{}", result.stdout());
        log::debug!("{}", result.stderr());
        log::debug!("{}", result.debug());

        if code != 0 && !options.allow_all_exit_codes {
            return Err(GitError::CommandFailed {
                code,
                stderr: result.stderr().trim().to_string(),
                command: command_str,
            });
        }

        Ok(result)
    }
}

fn record(
    result: &mut GitExecOutput,
    listener: &mut Option<&mut dyn OutputListener>,
    channel: Channel,
    bytes: &[u8],
    silent: bool,
) {
    let line = String::from_utf8_lossy(bytes);
    let line = line.strip_suffix('\r').unwrap_or(&line);

    if silent {
        log::debug!("{line}");
    } else {
        log::info!("{line}");
    }

    match channel {
        Channel::Stdout => {
            if let Some(l) = listener.as_deref_mut() {
                l.on_stdout(line);
            }
            result.add_stdout_line(line);
        }
        Channel::Stderr => {
            if let Some(l) = listener.as_deref_mut() {
                l.on_stderr(line);
            }
            result.add_stderr_line(line);
        }
    }
}
