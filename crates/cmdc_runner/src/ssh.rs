//! SSH transport built on russh.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Preferred, Sig};
use russh_keys::key::{KeyPair, PublicKey};
use tracing::{debug, info, warn};

use crate::config::{AlgorithmConfig, SshConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, RemoteConnection, RemoteExecutor, RemoteProcess};

/// Keeps only the wanted algorithms the transport implements, in the order
/// given by `wanted`.
fn narrow<T: Clone + AsRef<str>>(
    category: &str,
    available: &[T],
    wanted: &[String],
) -> RunnerResult<Vec<T>> {
    let mut selected = Vec::new();
    for name in wanted {
        match available.iter().find(|a| a.as_ref() == name.as_str()) {
            Some(algorithm) => selected.push(algorithm.clone()),
            None => warn!(category, algorithm = %name, "unsupported SSH algorithm skipped"),
        }
    }
    if selected.is_empty() {
        return Err(RunnerError::Config(format!(
            "no supported {} algorithm in {:?}",
            category, wanted
        )));
    }
    Ok(selected)
}

/// Pseudo key-exchange names that signal protocol extensions.
fn is_extension_marker(name: &str) -> bool {
    name.starts_with("ext-info-") || name.starts_with("kex-strict-")
}

/// Build the negotiated algorithm lists.
pub fn preferred_algorithms(config: &AlgorithmConfig) -> RunnerResult<Preferred> {
    let defaults = Preferred::default();

    let mut kex = narrow("kex", &defaults.kex, &config.kex)?;
    kex.extend(
        defaults
            .kex
            .iter()
            .filter(|k| is_extension_marker(k.as_ref()))
            .cloned(),
    );

    Ok(Preferred {
        kex: Cow::Owned(kex),
        key: Cow::Owned(narrow("host key", &defaults.key, &config.host_key)?),
        cipher: Cow::Owned(narrow("cipher", &defaults.cipher, &config.cipher)?),
        mac: Cow::Owned(narrow("mac", &defaults.mac, &config.mac)?),
        ..defaults
    })
}

/// Client callbacks: host key verification.
struct SshHandler {
    host: String,
    port: u16,
    strict: bool,
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if !self.strict {
            warn!(
                host = %self.host,
                fingerprint = %server_public_key.fingerprint(),
                "accepting unverified host key"
            );
            return Ok(true);
        }
        let known = russh_keys::check_known_hosts(&self.host, self.port, server_public_key)?;
        if !known {
            warn!(host = %self.host, "host key not found in known_hosts");
        }
        Ok(known)
    }
}

/// Connects to the configured host with public-key authentication.
pub struct SshExecutor {
    config: SshConfig,
    client_config: Arc<client::Config>,
}

impl SshExecutor {
    /// Validate the configuration and build the client settings.
    pub fn new(config: SshConfig) -> RunnerResult<Self> {
        if config.host.trim().is_empty() {
            return Err(RunnerError::Config("host is empty".to_string()));
        }
        if config.username.trim().is_empty() {
            return Err(RunnerError::Config("username is empty".to_string()));
        }

        let client_config = client::Config {
            preferred: preferred_algorithms(&config.algorithms)?,
            inactivity_timeout: config.inactivity_timeout_secs.map(Duration::from_secs),
            ..Default::default()
        };

        if let Some(warning) = config.host_key_warning() {
            warn!("{}", warning);
        }

        Ok(Self {
            config,
            client_config: Arc::new(client_config),
        })
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    fn load_key(&self) -> RunnerResult<KeyPair> {
        let path = self.config.resolved_key_path();
        russh_keys::load_secret_key(&path, None)
            .map_err(|e| RunnerError::Key(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn connect(&self) -> RunnerResult<Box<dyn RemoteConnection>> {
        let key = self.load_key()?;
        let handler = SshHandler {
            host: self.config.host.clone(),
            port: self.config.port,
            strict: self.config.strict_host_key_checking,
        };

        debug!(remote = %self.target(), "connecting");
        let mut handle = client::connect(
            self.client_config.clone(),
            (self.config.host.as_str(), self.config.port),
            handler,
        )
        .await
        .map_err(|e| RunnerError::Connect(e.to_string()))?;

        let authenticated = handle
            .authenticate_publickey(&self.config.username, Arc::new(key))
            .await
            .map_err(|e| RunnerError::Auth(e.to_string()))?;
        if !authenticated {
            return Err(RunnerError::Auth(format!(
                "public key rejected for {}",
                self.config.username
            )));
        }

        info!(remote = %self.target(), "SSH connection established");
        Ok(Box::new(SshConnection { handle }))
    }

    fn target(&self) -> String {
        self.config.address()
    }
}

struct SshConnection {
    handle: Handle<SshHandler>,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn exec(&self, command: &str) -> RunnerResult<Box<dyn RemoteProcess>> {
        let channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;
        debug!(command, "remote command started");
        Ok(Box::new(SshProcess {
            channel,
            code: None,
            signal: None,
            finished: false,
        }))
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            warn!(error = %e, "error during SSH disconnect");
        }
    }
}

struct SshProcess {
    channel: Channel<Msg>,
    code: Option<u32>,
    signal: Option<String>,
    finished: bool,
}

impl SshProcess {
    fn exit(&mut self) -> Option<ProcessOutput> {
        self.finished = true;
        Some(ProcessOutput::Exit {
            code: self.code,
            signal: self.signal.take(),
        })
    }
}

#[async_trait]
impl RemoteProcess for SshProcess {
    async fn next(&mut self) -> RunnerResult<Option<ProcessOutput>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let Some(msg) = self.channel.wait().await else {
                return Ok(self.exit());
            };
            match msg {
                ChannelMsg::Data { ref data } => {
                    return Ok(Some(ProcessOutput::Stdout(data.to_vec())));
                }
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    return Ok(Some(ProcessOutput::Stderr(data.to_vec())));
                }
                ChannelMsg::ExitStatus { exit_status } => self.code = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    self.signal = Some(format!("{:?}", signal_name));
                }
                ChannelMsg::Close => return Ok(self.exit()),
                _ => {}
            }
        }
    }

    async fn interrupt(&mut self) -> RunnerResult<()> {
        self.channel.signal(Sig::INT).await?;
        Ok(())
    }
}
