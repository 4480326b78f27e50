//! Git credentials service
//!
//! Resolves SSH credentials for background fetches without ever prompting: the SSH agent first,
//! then the conventional private keys under `~/.ssh`. Plaintext username/password is never offered.

use std::path::PathBuf;

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};

/// Private key file names tried, in order, after the SSH agent
pub const SSH_KEY_NAMES: [&str; 4] = ["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"];

/// Stateful credential resolver for one fetch.
///
/// libgit2 calls the credential callback again whenever the previous credential was rejected,
/// so each call hands out the next option until none are left.
pub struct CredentialResolver {
    ssh_dir: Option<PathBuf>,
    tried_agent: bool,
    next_key: usize,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialResolver {
    /// Create a resolver that looks for keys in the user's home directory
    pub fn new() -> Self {
        Self::with_ssh_dir(dirs::home_dir().map(|home| home.join(".ssh")))
    }

    /// Create a resolver that looks for keys in a specific directory
    pub fn with_ssh_dir(ssh_dir: Option<PathBuf>) -> Self {
        Self {
            ssh_dir,
            tried_agent: false,
            next_key: 0,
        }
    }

    /// Produce the next credential to offer the server
    pub fn resolve(
        &mut self,
        url: &str,
        username_from_url: Option<&str>,
        allowed_types: CredentialType,
    ) -> Result<Cred, git2::Error> {
        tracing::debug!(
            "Credential callback: host={:?}, username={:?}, allowed={:?}",
            extract_host(url),
            username_from_url,
            allowed_types
        );

        if !allowed_types.contains(CredentialType::SSH_KEY) {
            return Err(cancelled("server does not accept SSH key authentication"));
        }

        let username = username_from_url.unwrap_or("git");

        if !self.tried_agent {
            self.tried_agent = true;
            tracing::debug!("Trying SSH agent for user: {}", username);
            if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                return Ok(cred);
            }
        }

        while let Some(private_key) = self.next_key_path() {
            tracing::debug!("Trying SSH key: {:?}", private_key);
            if let Ok(cred) = Cred::ssh_key(username, None, &private_key, None) {
                return Ok(cred);
            }
        }

        Err(cancelled("no SSH credentials were accepted"))
    }

    /// Advance to the next existing private key file
    fn next_key_path(&mut self) -> Option<PathBuf> {
        let ssh_dir = self.ssh_dir.as_ref()?;
        while self.next_key < SSH_KEY_NAMES.len() {
            let candidate = ssh_dir.join(SSH_KEY_NAMES[self.next_key]);
            self.next_key += 1;
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Remote callbacks with this resolver wired in, plus transfer logging
    pub fn into_callbacks(mut self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();

        callbacks.credentials(move |url, username_from_url, allowed_types| {
            self.resolve(url, username_from_url, allowed_types)
        });

        callbacks.transfer_progress(|stats| {
            let received = stats.received_objects();
            let total = stats.total_objects();

            if total > 0 {
                let percent = (received as f64 / total as f64) * 100.0;
                tracing::debug!(
                    "Transfer progress: {}/{} objects ({:.1}%), {} bytes",
                    received,
                    total,
                    percent,
                    stats.received_bytes()
                );
            }

            true
        });

        callbacks.sideband_progress(|data| {
            if let Ok(msg) = std::str::from_utf8(data) {
                let msg = msg.trim();
                if !msg.is_empty() {
                    tracing::info!("Remote: {}", msg);
                }
            }
            true
        });

        callbacks
    }
}

/// "User cancelled" error, which makes libgit2 stop asking for credentials
fn cancelled(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::User, ErrorClass::Ssh, message)
}

/// Extract host from a git URL
fn extract_host(url: &str) -> Option<String> {
    // scp-like syntax: git@github.com:user/repo.git
    if url.contains('@') && url.contains(':') && !url.contains("://") {
        let host_part = url.split('@').nth(1)?;
        return host_part.split(':').next().map(|s| s.to_string());
    }

    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_host_ssh() {
        assert_eq!(
            extract_host("git@github.com:user/repo.git"),
            Some("github.com".to_string())
        );
    }

    #[test]
    fn test_extract_host_https() {
        assert_eq!(
            extract_host("https://github.com/user/repo.git"),
            Some("github.com".to_string())
        );
        assert_eq!(extract_host("/srv/git/repo.git"), None);
    }

    #[test]
    fn test_non_ssh_servers_are_refused() {
        let mut resolver = CredentialResolver::with_ssh_dir(None);
        let err = resolver
            .resolve(
                "https://example.com/repo.git",
                Some("alice"),
                CredentialType::USER_PASS_PLAINTEXT,
            )
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::User);
    }

    #[test]
    fn test_key_files_tried_in_order_skipping_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("id_ecdsa"), "key").unwrap();
        std::fs::write(dir.path().join("id_rsa"), "key").unwrap();

        let mut resolver = CredentialResolver::with_ssh_dir(Some(dir.path().to_path_buf()));
        assert_eq!(resolver.next_key_path(), Some(dir.path().join("id_rsa")));
        assert_eq!(resolver.next_key_path(), Some(dir.path().join("id_ecdsa")));
        assert_eq!(resolver.next_key_path(), None);
    }

    #[test]
    fn test_resolver_exhausts_to_user_cancelled() {
        let dir = TempDir::new().unwrap();
        let mut resolver = CredentialResolver::with_ssh_dir(Some(dir.path().to_path_buf()));
        // Agent is offered once; with no key files the next request is refused.
        resolver.tried_agent = true;

        let err = resolver
            .resolve("git@example.com:a/b.git", None, CredentialType::SSH_KEY)
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::User);
        assert_eq!(err.class(), ErrorClass::Ssh);
    }
}
