pub mod environment;
pub mod error;
pub mod ops;
pub mod output;
pub mod refs;
pub mod remote;
pub mod retry;
pub mod runner;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use environment::{ActionEnvironment, GitEnvironment, PathResolver, ToolResolver};
pub use error::{ErrorCategory, GitError};
pub use ops::{FetchOptions, FetchOutcome, WorkingBase, WorkingBaseType};
pub use output::{GitExecOutput, OutputListener};
pub use refs::{CheckoutInfo, TAGS_REF_SPEC};
pub use remote::RemoteDetail;
pub use retry::{RetryHelper, RetryPolicy};
pub use runner::{ExecOptions, GitCommandManager, GitCommandManagerBuilder};
pub use version::GitVersion;
