//! Remote host and session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Key exchange algorithms offered by default.
pub const DEFAULT_KEX: &[&str] = &[
    "curve25519-sha256",
    "curve25519-sha256@libssh.org",
    "ecdh-sha2-nistp256",
    "ecdh-sha2-nistp384",
    "ecdh-sha2-nistp521",
    "diffie-hellman-group-exchange-sha256",
];

/// Ciphers offered by default.
pub const DEFAULT_CIPHERS: &[&str] = &[
    "aes128-ctr",
    "aes192-ctr",
    "aes256-ctr",
    "aes128-gcm@openssh.com",
    "aes256-gcm@openssh.com",
];

/// Host key algorithms accepted by default.
pub const DEFAULT_HOST_KEYS: &[&str] = &[
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "rsa-sha2-256",
    "rsa-sha2-512",
    "ssh-rsa",
];

/// MACs offered by default.
pub const DEFAULT_MACS: &[&str] = &["hmac-sha2-256", "hmac-sha2-512"];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Algorithm lists negotiated with the remote host.
///
/// Names the transport does not implement are skipped with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    pub kex: Vec<String>,
    pub cipher: Vec<String>,
    pub host_key: Vec<String>,
    pub mac: Vec<String>,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            kex: owned(DEFAULT_KEX),
            cipher: owned(DEFAULT_CIPHERS),
            host_key: owned(DEFAULT_HOST_KEYS),
            mac: owned(DEFAULT_MACS),
        }
    }
}

/// SSH connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key used for public-key authentication (`~` is expanded)
    pub private_key: PathBuf,
    /// Verify the host key against `~/.ssh/known_hosts`
    pub strict_host_key_checking: bool,
    /// Seconds of inactivity before the transport gives up
    pub inactivity_timeout_secs: Option<u64>,
    pub algorithms: AlgorithmConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "nasty".to_string(),
            port: 22,
            username: "pi".to_string(),
            private_key: PathBuf::from("~/.ssh/id_rsa"),
            strict_host_key_checking: false,
            inactivity_timeout_secs: Some(600),
            algorithms: AlgorithmConfig::default(),
        }
    }
}

impl SshConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = path.into();
        self
    }

    pub fn strict_host_key_checking(mut self, enabled: bool) -> Self {
        self.strict_host_key_checking = enabled;
        self
    }

    /// Override fields from `SSH_HOST`, `SSH_PORT`, `SSH_USERNAME` and
    /// `SSH_PRIVATE_KEY`. An unparsable port is ignored.
    pub fn apply_env(mut self) -> Self {
        if let Ok(host) = std::env::var("SSH_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("SSH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.port = port;
        }
        if let Ok(username) = std::env::var("SSH_USERNAME") {
            self.username = username;
        }
        if let Ok(key) = std::env::var("SSH_PRIVATE_KEY") {
            self.private_key = PathBuf::from(key);
        }
        self
    }

    /// Private key path with a leading `~` replaced by `$HOME`.
    pub fn resolved_key_path(&self) -> PathBuf {
        expand_home(&self.private_key)
    }

    /// Warning to log when the host key will be accepted unverified.
    pub fn host_key_warning(&self) -> Option<String> {
        (!self.strict_host_key_checking).then(|| {
            format!(
                "host key of {} is not verified; set ssh.strict_host_key_checking = true",
                self.address()
            )
        })
    }

    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Session manager tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on connecting and authenticating
    pub connect_timeout: Duration,
    /// Total runtime ceiling of one invocation, if any
    pub max_runtime: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            max_runtime: Some(Duration::from_secs(300)),
        }
    }
}

impl SessionOptions {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_runtime(mut self, limit: Option<Duration>) -> Self {
        self.max_runtime = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SshConfig::default();
        assert_eq!(config.host, "nasty");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "pi");
        assert!(config.algorithms.kex.contains(&"curve25519-sha256".to_string()));
        assert_eq!(SessionOptions::default().max_runtime, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_host_key_warning_when_unverified() {
        let config = SshConfig::default();
        let warning = config.host_key_warning().unwrap();
        assert!(warning.contains("nasty:22"));

        let config = config.strict_host_key_checking(true);
        assert!(config.host_key_warning().is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SshConfig = from_json(
            r#"{"host": "nas.local", "algorithms": {"mac": ["hmac-sha2-512"]}}"#,
        );
        assert_eq!(config.host, "nas.local");
        assert_eq!(config.port, 22);
        assert_eq!(config.algorithms.mac, vec!["hmac-sha2-512".to_string()]);
        assert_eq!(config.algorithms.cipher.len(), DEFAULT_CIPHERS.len());
    }

    fn from_json(json: &str) -> SshConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_home_expansion() {
        let config = SshConfig::default().private_key("/etc/keys/id_ed25519");
        assert_eq!(config.resolved_key_path(), PathBuf::from("/etc/keys/id_ed25519"));

        if let Some(home) = std::env::var_os("HOME") {
            let config = SshConfig::default();
            assert_eq!(
                config.resolved_key_path(),
                PathBuf::from(home).join(".ssh/id_rsa")
            );
        }
    }
}
