use regex::RegexBuilder;
use serde::Serialize;

use super::error::GitError;

/// Where a remote lives on the hosting server and how it is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDetail {
    pub hostname: String,
    /// `"HTTPS"` or `"SSH"`.
    pub protocol: String,
    /// `owner/repo`, without a `.git` suffix.
    pub repository: String,
}

/// Host (with port, if any) of the hosting server URL.
pub fn server_hostname(server_url: &str) -> Result<String, GitError> {
    let invalid = || GitError::InvalidSetting {
        name: "server URL".to_string(),
        value: server_url.to_string(),
    };
    let parsed = url::Url::parse(server_url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = parsed.host_str().ok_or_else(invalid)?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Classifies `remote_url` against the hosting server at `server_url`.
///
/// Accepts `http(s)://[user@]host/owner/repo[.git]` and
/// `git@host:owner/repo.git`; anything else is `InvalidRemoteUrl`.
pub fn remote_detail(remote_url: &str, server_url: &str) -> Result<RemoteDetail, GitError> {
    let hostname = server_hostname(server_url)?;
    let host = regex::escape(&hostname);

    let https = RegexBuilder::new(&format!(r"^https?://(?:[^/@]*@)?{host}/(.+/.+?)(?:\.git)?$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| GitError::InvalidArgument(e.to_string()))?;
    if let Some(caps) = https.captures(remote_url) {
        return Ok(RemoteDetail {
            hostname,
            protocol: "HTTPS".to_string(),
            repository: caps[1].to_string(),
        });
    }

    let ssh = RegexBuilder::new(&format!(r"^git@{host}:(.+/.+)\.git$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| GitError::InvalidArgument(e.to_string()))?;
    if let Some(caps) = ssh.captures(remote_url) {
        return Ok(RemoteDetail {
            hostname,
            protocol: "SSH".to_string(),
            repository: caps[1].to_string(),
        });
    }

    Err(GitError::InvalidRemoteUrl {
        url: remote_url.to_string(),
        hostname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB: &str = "https://github.com";

    #[test]
    fn test_https_remote() {
        let detail = remote_detail("https://github.com/actions/checkout.git", GITHUB).unwrap();
        assert_eq!(
            detail,
            RemoteDetail {
                hostname: "github.com".into(),
                protocol: "HTTPS".into(),
                repository: "actions/checkout".into(),
            }
        );
    }

    #[test]
    fn test_https_remote_with_user_and_no_suffix() {
        let detail =
            remote_detail("https://x-access-token@github.com/owner/repo", GITHUB).unwrap();
        assert_eq!(detail.repository, "owner/repo");
        assert_eq!(detail.protocol, "HTTPS");
    }

    #[test]
    fn test_ssh_remote() {
        let detail = remote_detail("git@github.com:owner/repo.git", GITHUB).unwrap();
        assert_eq!(detail.protocol, "SSH");
        assert_eq!(detail.repository, "owner/repo");
    }

    #[test]
    fn test_enterprise_host_with_port() {
        let server = "https://ghe.example.com:8443";
        assert_eq!(server_hostname(server).unwrap(), "ghe.example.com:8443");
        let detail = remote_detail("https://ghe.example.com:8443/team/tool.git", server).unwrap();
        assert_eq!(detail.hostname, "ghe.example.com:8443");
        assert_eq!(detail.repository, "team/tool");
    }

    #[test]
    fn test_other_host_is_rejected() {
        let err = remote_detail("https://gitlab.com/owner/repo.git", GITHUB).unwrap_err();
        assert!(matches!(err, GitError::InvalidRemoteUrl { .. }));
    }

    #[test]
    fn test_missing_owner_is_rejected() {
        let err = remote_detail("https://github.com/repo", GITHUB).unwrap_err();
        assert!(matches!(err, GitError::InvalidRemoteUrl { .. }));
    }

    #[test]
    fn test_bad_server_url() {
        assert!(matches!(
            server_hostname("ftp://example.com"),
            Err(GitError::InvalidSetting { .. })
        ));
    }
}
