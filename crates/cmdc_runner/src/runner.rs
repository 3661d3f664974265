//! Remote transport traits.

use async_trait::async_trait;

use crate::error::RunnerResult;

/// One item read from a remote process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// The process ended. Produced once, after all output.
    Exit {
        code: Option<u32>,
        signal: Option<String>,
    },
}

/// Opens connections to the remote host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Connect and authenticate.
    async fn connect(&self) -> RunnerResult<Box<dyn RemoteConnection>>;

    /// Human-readable target, used in logs.
    fn target(&self) -> String;
}

/// An authenticated connection able to run commands.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Start `command` on the remote host.
    async fn exec(&self, command: &str) -> RunnerResult<Box<dyn RemoteProcess>>;

    /// Close the connection. Never fails; errors are logged.
    async fn close(&self);

    /// Run `command` to completion and return its combined, trimmed output.
    async fn capture(&self, command: &str) -> RunnerResult<String> {
        let mut process = self.exec(command).await?;
        let mut output = Vec::new();
        while let Some(item) = process.next().await? {
            match item {
                ProcessOutput::Stdout(data) | ProcessOutput::Stderr(data) => {
                    output.extend_from_slice(&data)
                }
                ProcessOutput::Exit { .. } => break,
            }
        }
        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }
}

/// A running remote process.
#[async_trait]
pub trait RemoteProcess: Send {
    /// Next output item, `None` once the stream is exhausted.
    ///
    /// Must be cancel safe: the session manager polls it inside `select!`.
    async fn next(&mut self) -> RunnerResult<Option<ProcessOutput>>;

    /// Send SIGINT to the process.
    async fn interrupt(&mut self) -> RunnerResult<()>;
}
