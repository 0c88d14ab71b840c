//! Refspec and checkout-target derivation for user-supplied refs.

use serde::Serialize;

use super::error::GitError;
use super::runner::GitCommandManager;

pub const TAGS_REF_SPEC: &str = "+refs/tags/*:refs/tags/*";

const HEADS_PREFIX: &str = "refs/heads/";
const PULL_PREFIX: &str = "refs/pull/";
const TAGS_PREFIX: &str = "refs/tags/";

/// What to pass to `git checkout`: a ref and, for branches, the remote
/// tracking ref to (re)create it from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutInfo {
    pub reference: String,
    pub start_point: Option<String>,
}

/// Case-insensitive prefix strip.
fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

fn require_target(reference: &str, commit: &str) -> Result<(), GitError> {
    if reference.is_empty() && commit.is_empty() {
        return Err(GitError::InvalidArgument(
            "ref and commit cannot both be empty".to_string(),
        ));
    }
    Ok(())
}

/// Refspecs fetching every branch and tag, plus the pull ref when `reference`
/// names one.
pub fn ref_spec_for_all_history(reference: &str, commit: &str) -> Vec<String> {
    let mut specs = vec![
        "+refs/heads/*:refs/remotes/origin/*".to_string(),
        TAGS_REF_SPEC.to_string(),
    ];
    if let Some(pull) = strip_prefix_ci(reference, PULL_PREFIX) {
        let source = if commit.is_empty() { reference } else { commit };
        specs.push(format!("+{source}:refs/remotes/pull/{pull}"));
    }
    specs
}

/// Refspecs fetching just what is needed to check out `reference`/`commit`.
pub fn ref_spec(reference: &str, commit: &str) -> Result<Vec<String>, GitError> {
    require_target(reference, commit)?;

    if !commit.is_empty() {
        let spec = if let Some(branch) = strip_prefix_ci(reference, HEADS_PREFIX) {
            format!("+{commit}:refs/remotes/origin/{branch}")
        } else if let Some(pull) = strip_prefix_ci(reference, PULL_PREFIX) {
            format!("+{commit}:refs/remotes/pull/{pull}")
        } else if strip_prefix_ci(reference, TAGS_PREFIX).is_some() {
            format!("+{commit}:{reference}")
        } else {
            commit.to_string()
        };
        return Ok(vec![spec]);
    }

    if strip_prefix_ci(reference, "refs/").is_none() {
        return Ok(vec![
            format!("+refs/heads/{reference}*:refs/remotes/origin/{reference}*"),
            format!("+refs/tags/{reference}*:refs/tags/{reference}*"),
        ]);
    }
    if let Some(branch) = strip_prefix_ci(reference, HEADS_PREFIX) {
        return Ok(vec![format!("+{reference}:refs/remotes/origin/{branch}")]);
    }
    if let Some(pull) = strip_prefix_ci(reference, PULL_PREFIX) {
        return Ok(vec![format!("+{reference}:refs/remotes/pull/{pull}")]);
    }
    Ok(vec![format!("+{reference}:{reference}")])
}

/// Decides what to check out once the fetch has completed.
///
/// Bare names are looked up first as `origin/<name>` branches, then as
/// tags; a name matching neither is `RefNotFound`.
pub async fn checkout_info(
    git: &GitCommandManager,
    reference: &str,
    commit: &str,
) -> Result<CheckoutInfo, GitError> {
    require_target(reference, commit)?;

    if reference.is_empty() {
        return Ok(CheckoutInfo {
            reference: commit.to_string(),
            start_point: None,
        });
    }
    if let Some(branch) = strip_prefix_ci(reference, HEADS_PREFIX) {
        return Ok(CheckoutInfo {
            reference: branch.to_string(),
            start_point: Some(format!("refs/remotes/origin/{branch}")),
        });
    }
    if let Some(pull) = strip_prefix_ci(reference, PULL_PREFIX) {
        return Ok(CheckoutInfo {
            reference: format!("refs/remotes/pull/{pull}"),
            start_point: None,
        });
    }
    if strip_prefix_ci(reference, TAGS_PREFIX).is_some() {
        return Ok(CheckoutInfo {
            reference: reference.to_string(),
            start_point: None,
        });
    }
    if strip_prefix_ci(reference, "refs/").is_some() {
        let target = if commit.is_empty() { reference } else { commit };
        return Ok(CheckoutInfo {
            reference: target.to_string(),
            start_point: None,
        });
    }

    if git.branch_exists(true, &format!("origin/{reference}")).await? {
        Ok(CheckoutInfo {
            reference: reference.to_string(),
            start_point: Some(format!("refs/remotes/origin/{reference}")),
        })
    } else if git.tag_exists(reference).await? {
        Ok(CheckoutInfo {
            reference: format!("refs/tags/{reference}"),
            start_point: None,
        })
    } else {
        Err(GitError::RefNotFound {
            name: reference.to_string(),
        })
    }
}
