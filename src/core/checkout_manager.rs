use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::core::settings::CheckoutSettings;
use crate::git::refs::{checkout_info, ref_spec, ref_spec_for_all_history};
use crate::git::runner::MINIMUM_GIT_SPARSE_CHECKOUT_VERSION;
use crate::git::{
    FetchOptions, GitCommandManager, GitError, GitVersion, PathResolver, RemoteDetail,
    ToolResolver, WorkingBase,
};

/// What a finished checkout left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSummary {
    pub path: PathBuf,
    pub repository_url: String,
    /// Ref handed to `git checkout`.
    pub reference: String,
    pub start_point: Option<String>,
    pub commit: String,
    pub working_base: WorkingBase,
    pub git_version: String,
    /// `None` when the remote is not on the configured hosting server.
    pub remote: Option<RemoteDetail>,
}

/// Drives a complete repository checkout into a directory.
///
/// An existing clone of the same remote is cleaned and reused. A clone of
/// some other remote is replaced. Any other non-empty directory is refused.
pub struct CheckoutManager {
    resolver: Arc<dyn ToolResolver>,
}

impl Default for CheckoutManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutManager {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(PathResolver),
        }
    }

    pub fn with_tool_resolver(resolver: Arc<dyn ToolResolver>) -> Self {
        Self { resolver }
    }

    pub async fn checkout(&self, settings: &CheckoutSettings) -> Result<CheckoutSummary, GitError> {
        let path = settings.path.as_path();
        tokio::fs::create_dir_all(path).await?;

        let git = GitCommandManager::builder(path)
            .lfs(settings.lfs)
            .sparse_checkout(!settings.sparse_checkout.is_empty())
            .retry_policy(settings.retry)
            .tool_resolver(self.resolver.clone())
            .action_environment(settings.action.clone())
            .build()
            .await?;

        let reused = self.prepare_existing(&git, settings).await?;
        if !reused {
            log::info!("Initializing the repository");
            git.init().await?;
            git.remote_add("origin", &settings.repository_url).await?;
        }

        if !git.try_disable_automatic_garbage_collection().await? {
            log::warn!("Unable to turn off git automatic garbage collection. The git fetch operation may trigger garbage collection and cause a delay.");
        }

        if settings.lfs {
            git.lfs_install().await?;
        }

        let mut reference = settings.reference.clone();
        if reference.is_empty() && settings.commit.is_empty() {
            log::info!("Determining the default branch");
            reference = git.default_branch(&settings.repository_url).await?;
        }

        log::info!("Fetching the repository");
        let options = FetchOptions {
            depth: (settings.fetch_depth > 0).then_some(settings.fetch_depth),
            fetch_tags: settings.fetch_tags,
            filter: settings.filter.clone(),
            show_progress: settings.show_progress,
            ..Default::default()
        };
        let ref_specs = if settings.fetch_depth == 0 {
            ref_spec_for_all_history(&reference, &settings.commit)
        } else {
            ref_spec(&reference, &settings.commit)?
        };
        let outcome = git.fetch_outcome(&ref_specs, &options).await;
        if settings.fetch_depth > 0 && is_bare_name(&reference, &settings.commit) {
            // A pattern matching nothing makes fetch exit 1; checkout_info
            // reports the missing ref by name.
            if !outcome.succeeded() {
                log::warn!("Nothing fetched for '{reference}'");
            }
        } else {
            outcome.into_result()?;
        }

        log::info!("Determining the checkout info");
        let info = checkout_info(&git, &reference, &settings.commit).await?;

        if settings.lfs {
            log::info!("Fetching LFS objects");
            let lfs_ref = info.start_point.as_deref().unwrap_or(&info.reference);
            git.lfs_fetch(lfs_ref).await?;
        }

        if !settings.sparse_checkout.is_empty() {
            log::info!("Setting up sparse checkout");
            if settings.sparse_checkout_cone_mode {
                git.sparse_checkout(&settings.sparse_checkout).await?;
            } else {
                git.sparse_checkout_non_cone_mode(&settings.sparse_checkout)
                    .await?;
            }
        }

        log::info!("Checking out the ref");
        git.checkout(&info.reference, info.start_point.as_deref())
            .await?;

        if settings.submodules.is_enabled() {
            let recursive = settings.submodules.is_recursive();
            log::info!("Fetching submodules");
            git.submodule_sync(recursive).await?;
            git.submodule_update(settings.fetch_depth, recursive)
                .await?;
            git.submodule_foreach("git config --local gc.auto 0", recursive)
                .await?;
        }

        let commit = git.rev_parse("HEAD").await?;
        let working_base = git.working_base().await?;
        let remote = git.remote_detail(&settings.repository_url).ok();

        Ok(CheckoutSummary {
            path: settings.path.clone(),
            repository_url: settings.repository_url.clone(),
            reference: info.reference,
            start_point: info.start_point,
            commit,
            working_base,
            git_version: git.version().to_string(),
            remote,
        })
    }

    /// Readies an existing clone for reuse. Returns `false` after emptying
    /// the directory when it holds a git repository that cannot be reused.
    /// A non-empty directory without a repository is left untouched and
    /// fails with `DirectoryNotEmpty`.
    async fn prepare_existing(
        &self,
        git: &GitCommandManager,
        settings: &CheckoutSettings,
    ) -> Result<bool, GitError> {
        let path = git.working_directory();
        let git_dir = path.join(".git");

        if tokio::fs::metadata(&git_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            if git.try_get_fetch_url().await? == settings.repository_url {
                if self.reuse(git, &git_dir, settings.clean).await? {
                    return Ok(true);
                }
            } else {
                log::info!("Existing repository does not match {}", settings.repository_url);
            }
        } else if !is_empty_dir(path).await? {
            return Err(GitError::DirectoryNotEmpty {
                path: path.to_path_buf(),
            });
        }

        remove_dir_contents(path).await?;
        Ok(false)
    }

    async fn reuse(
        &self,
        git: &GitCommandManager,
        git_dir: &Path,
        clean: bool,
    ) -> Result<bool, GitError> {
        for lock in ["index.lock", "shallow.lock"] {
            let lock_path = git_dir.join(lock);
            if tokio::fs::remove_file(&lock_path).await.is_ok() {
                log::debug!("Removed stale {}", lock_path.display());
            }
        }

        if clean {
            log::info!("Cleaning the repository");
            if !git.try_clean().await? || !git.try_reset().await? {
                log::warn!("Unable to clean or reset the repository. The repository will be recreated instead.");
                return Ok(false);
            }
        }

        let sparse_minimum = GitVersion::parse(MINIMUM_GIT_SPARSE_CHECKOUT_VERSION);
        if !git.sparse_checkout_enabled() && git.version().check_minimum(&sparse_minimum)? {
            git.disable_sparse_checkout().await?;
        }
        Ok(true)
    }
}

/// A ref given by short name, fetched through wildcard refspecs.
fn is_bare_name(reference: &str, commit: &str) -> bool {
    commit.is_empty()
        && !reference.is_empty()
        && !reference
            .get(..5)
            .is_some_and(|head| head.eq_ignore_ascii_case("refs/"))
}

async fn is_empty_dir(path: &Path) -> Result<bool, GitError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

async fn remove_dir_contents(path: &Path) -> Result<(), GitError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
