use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::error::{ErrorCategory, GitError};
use super::output::GitExecOutput;
use super::refs::TAGS_REF_SPEC;
use super::remote::{remote_detail, RemoteDetail};
use super::runner::{ExecOptions, GitCommandManager};

/// How the checkout's starting point was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingBaseType {
    Branch,
    Commit,
    Pull,
}

/// The ref or commit a checkout started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingBase {
    pub name: String,
    pub kind: WorkingBaseType,
}

/// Options for the general multi-refspec fetch.
///
/// With no `depth`, an existing shallow clone is deepened with
/// `--unshallow`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchOptions {
    /// Remote to fetch from; `origin` when unset.
    pub remote: Option<String>,
    pub depth: Option<u32>,
    pub fetch_tags: bool,
    /// Partial-clone filter spec, e.g. `blob:none`.
    pub filter: Option<String>,
    pub show_progress: bool,
    pub force: bool,
}

/// Result of a fetch that never raises.
///
/// Keeps the underlying error for callers that need to tell a version or
/// configuration problem apart from a network failure; converts to `bool`
/// for callers that do not.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched,
    Failed(GitError),
}

impl FetchOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    pub fn error(&self) -> Option<&GitError> {
        match self {
            Self::Fetched => None,
            Self::Failed(err) => Some(err),
        }
    }

    pub fn failure_category(&self) -> Option<ErrorCategory> {
        self.error().map(GitError::category)
    }

    pub fn into_result(self) -> Result<(), GitError> {
        match self {
            Self::Fetched => Ok(()),
            Self::Failed(err) => Err(err),
        }
    }
}

impl From<Result<(), GitError>> for FetchOutcome {
    fn from(result: Result<(), GitError>) -> Self {
        match result {
            Ok(()) => Self::Fetched,
            Err(err) => Self::Failed(err),
        }
    }
}

impl From<FetchOutcome> for bool {
    fn from(outcome: FetchOutcome) -> Self {
        outcome.succeeded()
    }
}

/// Strips `refs/heads/` or `refs/remotes/` from a full ref name.
pub fn short_branch_name(full_name: &str) -> &str {
    full_name
        .strip_prefix("refs/heads/")
        .or_else(|| full_name.strip_prefix("refs/remotes/"))
        .unwrap_or(full_name)
}

/// Extracts the default branch ref from `ls-remote --symref <url> HEAD`
/// output, whose first line reads `ref: refs/heads/main\tHEAD`.
///
/// Takes the first line that starts with `ref:` or ends with `HEAD` and
/// strips both markers.
pub fn parse_default_branch(ls_remote_output: &str) -> Result<String, GitError> {
    for line in ls_remote_output.trim().lines() {
        let line = line.trim();
        if line.starts_with("ref:") || line.ends_with("HEAD") {
            let line = line.strip_prefix("ref:").unwrap_or(line);
            let line = line.strip_suffix("HEAD").unwrap_or(line);
            return Ok(line.trim().to_string());
        }
    }
    Err(GitError::unexpected(
        "unexpected output when retrieving default branch",
    ))
}

fn scope(global: bool) -> &'static str {
    if global {
        "--global"
    } else {
        "--local"
    }
}

impl GitCommandManager {
    async fn exec_default(&self, args: &[&str]) -> Result<GitExecOutput, GitError> {
        self.exec_git(args, ExecOptions::default()).await
    }

    /// Runs `args`, accepting any exit code, and reports whether it was 0.
    async fn exec_succeeds(&self, args: &[&str]) -> Result<bool, GitError> {
        let output = self
            .exec_git(args, ExecOptions::default().allow_all_exit_codes())
            .await?;
        Ok(output.succeeded())
    }

    pub async fn init(&self) -> Result<(), GitError> {
        let path = self.working_directory.to_string_lossy().to_string();
        self.exec_default(&["init", &path]).await?;
        Ok(())
    }

    pub async fn remote_add(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.exec_default(&["remote", "add", name, url]).await?;
        Ok(())
    }

    pub async fn branch_delete(&self, remote: bool, branch: &str) -> Result<(), GitError> {
        let mut args = vec!["branch", "--delete", "--force"];
        if remote {
            args.push("--remote");
        }
        args.push(branch);
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn branch_exists(&self, remote: bool, pattern: &str) -> Result<bool, GitError> {
        let mut args = vec!["branch", "--list"];
        if remote {
            args.push("--remote");
        }
        args.push(pattern);
        let output = self.exec_default(&args).await?;
        Ok(!output.trimmed().is_empty())
    }

    /// Lists local branches, or `origin` remote-tracking branches, by bare
    /// name (`main`, `origin/feature-x`).
    ///
    /// Uses `rev-parse --symbolic-full-name` rather than `branch --list`,
    /// whose symbolic listing is broken on old gits, and runs silently
    /// because empty repositories print noise on stderr.
    pub async fn branch_list(&self, remote: bool) -> Result<Vec<String>, GitError> {
        let selector = if remote { "--remotes=origin" } else { "--branches" };
        let output = self
            .exec_git(
                &["rev-parse", "--symbolic-full-name", selector],
                ExecOptions::default().silent(),
            )
            .await?;

        Ok(output
            .stdout_lines()
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| short_branch_name(l).to_string())
            .collect())
    }

    pub async fn tag_exists(&self, pattern: &str) -> Result<bool, GitError> {
        let output = self.exec_default(&["tag", "--list", pattern]).await?;
        Ok(!output.trimmed().is_empty())
    }

    /// Checks out `reference`, or force-(re)creates branch `reference` at
    /// `start_point` when one is given.
    pub async fn checkout(
        &self,
        reference: &str,
        start_point: Option<&str>,
    ) -> Result<(), GitError> {
        let mut args = vec!["checkout", "--progress", "--force"];
        match start_point {
            Some(start) => args.extend(["-B", reference, start]),
            None => args.push(reference),
        }
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn checkout_detach(&self) -> Result<(), GitError> {
        self.exec_default(&["checkout", "--detach"]).await?;
        Ok(())
    }

    pub async fn config(
        &self,
        key: &str,
        value: &str,
        global: bool,
        add: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["config", scope(global)];
        if add {
            args.push("--add");
        }
        args.extend([key, value]);
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn config_exists(&self, key: &str, global: bool) -> Result<bool, GitError> {
        let pattern = regex::escape(key);
        self.exec_succeeds(&["config", scope(global), "--name-only", "--get-regexp", &pattern])
            .await
    }

    pub async fn try_config_unset(&self, key: &str, global: bool) -> Result<bool, GitError> {
        self.exec_succeeds(&["config", scope(global), "--unset-all", key])
            .await
    }

    /// `remote.origin.url`, or an empty string when unset or multi-valued.
    pub async fn try_get_fetch_url(&self) -> Result<String, GitError> {
        let output = self
            .exec_git(
                &["config", "--local", "--get", "remote.origin.url"],
                ExecOptions::default().allow_all_exit_codes(),
            )
            .await?;
        if !output.succeeded() {
            return Ok(String::new());
        }
        let url = output.trimmed();
        if url.contains('\n') {
            return Ok(String::new());
        }
        Ok(url)
    }

    pub async fn try_disable_automatic_garbage_collection(&self) -> Result<bool, GitError> {
        self.exec_succeeds(&["config", "--local", "gc.auto", "0"]).await
    }

    /// Classifies the `origin` remote against the active hosting server.
    pub async fn repo_remote_detail(&self) -> Result<RemoteDetail, GitError> {
        let url = self.try_get_fetch_url().await?;
        self.remote_detail(&url)
    }

    /// Classifies `remote_url` against the active hosting server.
    pub fn remote_detail(&self, remote_url: &str) -> Result<RemoteDetail, GitError> {
        remote_detail(remote_url, &self.action_env.server_url)
    }

    /// Resolves the ref the checkout started from.
    ///
    /// A pull-request ref hint wins (`refs/remotes/pull/<n>/merge`). Otherwise
    /// a symbolic HEAD means a branch and a detached HEAD means a commit.
    pub async fn working_base(&self) -> Result<WorkingBase, GitError> {
        if let Some(pull) = self.action_env.pull_request_ref() {
            return Ok(WorkingBase {
                name: format!("refs/remotes/pull/{pull}"),
                kind: WorkingBaseType::Pull,
            });
        }

        let symbolic = self
            .exec_git(
                &["symbolic-ref", "HEAD", "--short"],
                ExecOptions::default().allow_all_exit_codes().silent(),
            )
            .await?;
        if symbolic.succeeded() {
            return Ok(WorkingBase {
                name: symbolic.trimmed(),
                kind: WorkingBaseType::Branch,
            });
        }

        Ok(WorkingBase {
            name: self.rev_parse("HEAD").await?,
            kind: WorkingBaseType::Commit,
        })
    }

    pub async fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        let output = self.exec_default(&["rev-parse", reference]).await?;
        Ok(output.trimmed())
    }

    pub async fn rev_list(
        &self,
        commit_expression: &[&str],
        options: &[&str],
    ) -> Result<String, GitError> {
        let mut args = vec!["rev-list"];
        args.extend_from_slice(options);
        args.extend_from_slice(commit_expression);
        let output = self.exec_default(&args).await?;
        Ok(output.trimmed())
    }

    async fn count_range(&self, range: &str, side: &str) -> Result<u64, GitError> {
        let count = self.rev_list(&[range], &[side, "--count"]).await?;
        count
            .parse()
            .map_err(|_| GitError::unexpected(format!("rev-list count was '{count}'")))
    }

    /// Commits reachable from `branch2` but not `branch1`.
    pub async fn commits_ahead(&self, branch1: &str, branch2: &str) -> Result<u64, GitError> {
        self.count_range(&format!("{branch1}...{branch2}"), "--right-only")
            .await
    }

    /// Commits reachable from `branch1` but not `branch2`.
    pub async fn commits_behind(&self, branch1: &str, branch2: &str) -> Result<u64, GitError> {
        self.count_range(&format!("{branch1}...{branch2}"), "--left-only")
            .await
    }

    pub async fn is_ahead(&self, branch1: &str, branch2: &str) -> Result<bool, GitError> {
        Ok(self.commits_ahead(branch1, branch2).await? > 0)
    }

    pub async fn is_behind(&self, branch1: &str, branch2: &str) -> Result<bool, GitError> {
        Ok(self.commits_behind(branch1, branch2).await? > 0)
    }

    pub async fn is_even(&self, branch1: &str, branch2: &str) -> Result<bool, GitError> {
        Ok(!self.is_ahead(branch1, branch2).await? && !self.is_behind(branch1, branch2).await?)
    }

    pub async fn is_detached(&self) -> Result<bool, GitError> {
        // `branch --show-current` would be simpler but needs git 2.22.
        let output = self
            .exec_git(
                &["rev-parse", "--symbolic-full-name", "--verify", "--quiet", "HEAD"],
                ExecOptions::default().allow_all_exit_codes(),
            )
            .await?;
        Ok(!output.trimmed().starts_with("refs/heads/"))
    }

    pub async fn sha_exists(&self, sha: &str) -> Result<bool, GitError> {
        let object = format!("{sha}^{{object}}");
        self.exec_succeeds(&["rev-parse", "--verify", "--quiet", &object])
            .await
    }

    /// `true` iff `git diff --quiet` reports differences (exit code 1).
    pub async fn has_diff(&self, options: &[&str]) -> Result<bool, GitError> {
        let mut args = vec!["diff", "--quiet"];
        args.extend_from_slice(options);
        let output = self
            .exec_git(&args, ExecOptions::default().allow_all_exit_codes())
            .await?;
        Ok(output.exit_code() == 1)
    }

    pub async fn is_dirty(&self, untracked: bool, pathspec: &[&str]) -> Result<bool, GitError> {
        let mut pathspec_args = Vec::new();
        if !pathspec.is_empty() {
            pathspec_args.push("--");
            pathspec_args.extend_from_slice(pathspec);
        }

        if untracked {
            let mut status_args = vec!["--porcelain", "-unormal"];
            status_args.extend_from_slice(&pathspec_args);
            if !self.status(&status_args).await?.is_empty() {
                return Ok(true);
            }
        }
        if self.has_diff(&pathspec_args).await? {
            return Ok(true);
        }
        let mut staged_args = vec!["--staged"];
        staged_args.extend_from_slice(&pathspec_args);
        self.has_diff(&staged_args).await
    }

    pub async fn status(&self, options: &[&str]) -> Result<String, GitError> {
        let mut args = vec!["status"];
        args.extend_from_slice(options);
        let output = self.exec_default(&args).await?;
        Ok(output.trimmed())
    }

    /// Returns `false` when there was nothing to stash.
    pub async fn stash_push(&self, options: &[&str]) -> Result<bool, GitError> {
        let mut args = vec!["stash", "push"];
        args.extend_from_slice(options);
        let output = self.exec_default(&args).await?;
        Ok(output.trimmed() != "No local changes to save")
    }

    pub async fn stash_pop(&self, options: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["stash", "pop"];
        args.extend_from_slice(options);
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn push(&self, options: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["push"];
        args.extend_from_slice(options);
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn pull(&self, options: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["pull"];
        args.extend_from_slice(options);
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn symbolic_ref(&self, reference: &str, options: &[&str]) -> Result<String, GitError> {
        let mut args = vec!["symbolic-ref"];
        args.extend_from_slice(options);
        args.push(reference);
        let output = self.exec_default(&args).await?;
        Ok(output.trimmed())
    }

    /// Last commit, either in full (silent) or rendered with `format`.
    pub async fn log1(&self, format: Option<&str>) -> Result<String, GitError> {
        let (args, options) = match format {
            Some(f) => (vec!["log", "-1", f], ExecOptions::default()),
            None => (vec!["log", "-1"], ExecOptions::default().silent()),
        };
        let output = self.exec_git(&args, options).await?;
        Ok(output.stdout())
    }

    /// Default branch of the remote at `repository_url` (e.g.
    /// `refs/heads/main`), queried without cloning. Retried.
    pub async fn default_branch(&self, repository_url: &str) -> Result<String, GitError> {
        let args = [
            "ls-remote",
            "--quiet",
            "--exit-code",
            "--symref",
            repository_url,
            "HEAD",
        ];
        let args = &args[..];
        let output = self
            .retry
            .execute(move || self.exec_git(args, ExecOptions::default()))
            .await?;
        parse_default_branch(&output.stdout())
    }

    async fn fetch_args(&self, ref_specs: &[String], options: &FetchOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-c", "protocol.version=2", "fetch"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if !ref_specs.iter().any(|s| s == TAGS_REF_SPEC) && !options.fetch_tags {
            args.push("--no-tags".to_string());
        }
        args.push("--prune".to_string());
        args.push("--no-recurse-submodules".to_string());
        if options.force {
            args.push("--force".to_string());
        }
        if options.show_progress {
            args.push("--progress".to_string());
        }
        if let Some(filter) = &options.filter {
            args.push(format!("--filter={filter}"));
        }

        match options.depth {
            Some(depth) if depth > 0 => args.push(format!("--depth={depth}")),
            _ => {
                let shallow_marker = self.working_directory.join(".git").join("shallow");
                let shallow = tokio::fs::metadata(&shallow_marker)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if shallow {
                    args.push("--unshallow".to_string());
                }
            }
        }

        args.push(options.remote.clone().unwrap_or_else(|| "origin".to_string()));
        args.extend(ref_specs.iter().cloned());
        args
    }

    /// Fetches `ref_specs`, retrying transient failures.
    pub async fn try_fetch(
        &self,
        ref_specs: &[String],
        options: &FetchOptions,
    ) -> Result<(), GitError> {
        let owned = self.fetch_args(ref_specs, options).await;
        let args: Vec<&str> = owned.iter().map(String::as_str).collect();
        let args = args.as_slice();

        self.retry
            .execute(move || self.exec_git(args, ExecOptions::default()))
            .await?;
        Ok(())
    }

    /// Fetches `ref_specs`; every failure, including retry exhaustion, is
    /// captured in the outcome instead of being raised.
    pub async fn fetch_outcome(&self, ref_specs: &[String], options: &FetchOptions) -> FetchOutcome {
        let outcome = FetchOutcome::from(self.try_fetch(ref_specs, options).await);
        if let Some(err) = outcome.error() {
            log::warn!("fetch failed: {err}");
        }
        outcome
    }

    pub async fn fetch(&self, ref_specs: &[String], options: &FetchOptions) -> bool {
        self.fetch_outcome(ref_specs, options).await.succeeded()
    }

    /// Fetches one branch of `remote` into `refs/remotes/<remote>/<branch>`.
    /// Never raises; returns `false` on any failure.
    pub async fn fetch_branch(&self, remote: &str, branch: &str, depth: u32) -> bool {
        let ref_specs = vec![format!("{branch}:refs/remotes/{remote}/{branch}")];
        let options = FetchOptions {
            remote: Some(remote.to_string()),
            depth: Some(depth),
            force: true,
            ..Default::default()
        };
        self.fetch(&ref_specs, &options).await
    }

    pub async fn lfs_install(&self) -> Result<(), GitError> {
        self.exec_default(&["lfs", "install", "--local"]).await?;
        Ok(())
    }

    /// Downloads LFS objects for `reference`. Retried.
    pub async fn lfs_fetch(&self, reference: &str) -> Result<(), GitError> {
        let args = ["lfs", "fetch", "origin", reference];
        let args = &args[..];
        self.retry
            .execute(move || self.exec_git(args, ExecOptions::default()))
            .await?;
        Ok(())
    }

    pub async fn submodule_sync(&self, recursive: bool) -> Result<(), GitError> {
        let mut args = vec!["submodule", "sync"];
        if recursive {
            args.push("--recursive");
        }
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn submodule_update(&self, fetch_depth: u32, recursive: bool) -> Result<(), GitError> {
        let depth = format!("--depth={fetch_depth}");
        let mut args = vec![
            "-c",
            "protocol.version=2",
            "submodule",
            "update",
            "--init",
            "--force",
        ];
        if fetch_depth > 0 {
            args.push(&depth);
        }
        if recursive {
            args.push("--recursive");
        }
        self.exec_default(&args).await?;
        Ok(())
    }

    pub async fn submodule_status(&self) -> Result<bool, GitError> {
        let output = self
            .exec_git(
                &["submodule", "status"],
                ExecOptions::default().allow_all_exit_codes(),
            )
            .await?;
        log::debug!("{}", output.stdout());
        Ok(output.succeeded())
    }

    pub async fn submodule_foreach(&self, command: &str, recursive: bool) -> Result<String, GitError> {
        let mut args = vec!["submodule", "foreach"];
        if recursive {
            args.push("--recursive");
        }
        args.push(command);
        let output = self.exec_default(&args).await?;
        Ok(output.stdout())
    }

    pub async fn try_clean(&self) -> Result<bool, GitError> {
        self.exec_succeeds(&["clean", "-ffdx"]).await
    }

    pub async fn try_reset(&self) -> Result<bool, GitError> {
        self.exec_succeeds(&["reset", "--hard", "HEAD"]).await
    }

    /// Cone-mode sparse checkout of `patterns`.
    pub async fn sparse_checkout(&self, patterns: &[String]) -> Result<(), GitError> {
        let mut args = vec!["sparse-checkout", "set"];
        args.extend(patterns.iter().map(String::as_str));
        self.exec_default(&args).await?;
        Ok(())
    }

    /// Non-cone sparse checkout: enables `core.sparseCheckout` and appends
    /// `patterns` to the repository's sparse-checkout file.
    pub async fn sparse_checkout_non_cone_mode(&self, patterns: &[String]) -> Result<(), GitError> {
        self.exec_default(&["config", "core.sparseCheckout", "true"])
            .await?;
        let output = self
            .exec_default(&["rev-parse", "--git-path", "info/sparse-checkout"])
            .await?;
        let path = self.working_directory.join(output.stdout().trim_end());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{}\n", patterns.join("\n")).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn disable_sparse_checkout(&self) -> Result<(), GitError> {
        self.exec_default(&["sparse-checkout", "disable"]).await?;
        // `sparse-checkout disable` leaves this behind even on a pristine repo.
        self.try_config_unset("extensions.worktreeConfig", false)
            .await?;
        Ok(())
    }
}
