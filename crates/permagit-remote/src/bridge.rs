//! Remote-helper line protocol and transport forwarding.
//!
//! The bridge answers `capabilities` with `connect`, and on `connect <service>`
//! spawns `<service> <bare-path>` and forwards the client's input to it and
//! its output back to the client, byte for byte, until it exits. A blank
//! line or end of input before that ends the session.

use crate::scanner::{MarkerScanner, UNPACK_OK};
use permagit_sync::REPOSITORY_ENV;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;

const COPY_BUFFER: usize = 8 * 1024;

/// Errors that end a bridge session abnormally.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Reading or writing a protocol stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport subcommand could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Transport subcommand requested by `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Service {
    /// `git-upload-pack`: the client fetches.
    UploadPack,
    /// `git-receive-pack`: the client pushes.
    ReceivePack,
    /// Any other program name.
    Other(String),
}

impl Service {
    /// Classifies a `connect` argument.
    pub fn parse(name: &str) -> Self {
        match name {
            "git-upload-pack" => Self::UploadPack,
            "git-receive-pack" => Self::ReceivePack,
            other => Self::Other(other.to_string()),
        }
    }

    /// Program to spawn.
    pub fn program(&self) -> &str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

/// How a bridge session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Blank line or end of input before any `connect`.
    Terminated,
    /// The connect policy rejected the service; nothing was spawned.
    Refused {
        /// Requested service.
        service: Service,
    },
    /// The transport ran to completion.
    Connected {
        /// Service that ran.
        service: Service,
        /// Child exit code; `None` if killed by a signal.
        exit_code: Option<i32>,
        /// Whether the child reported unpacking pushed objects.
        objects_received: bool,
    },
}

/// Decides whether a `connect` may proceed.
pub trait ConnectPolicy: Send + Sync {
    /// Returns false to refuse `service`. May report to the operator.
    fn authorize(&self, service: &Service) -> bool;
}

/// Policy that accepts every service.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ConnectPolicy for AllowAll {
    fn authorize(&self, _service: &Service) -> bool {
        true
    }
}

/// One remote-helper session against a local bare repository.
pub struct Bridge<'a> {
    bare_path: PathBuf,
    policy: &'a dyn ConnectPolicy,
}

impl<'a> Bridge<'a> {
    /// Create a bridge serving `bare_path`.
    pub fn new(bare_path: impl Into<PathBuf>, policy: &'a dyn ConnectPolicy) -> Self {
        Self {
            bare_path: bare_path.into(),
            policy,
        }
    }

    /// Path passed to the transport subcommand.
    pub fn bare_path(&self) -> &Path {
        &self.bare_path
    }

    /// Runs the protocol loop over the given streams.
    ///
    /// `output` carries protocol replies and the child's standard output;
    /// `errors` carries the child's standard error.
    pub async fn run<R, W, E>(&self, input: R, output: &mut W, errors: &mut E) -> Result<BridgeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::debug!("Input closed before connect");
                return Ok(BridgeOutcome::Terminated);
            }

            let command = line.trim();
            if command.is_empty() {
                return Ok(BridgeOutcome::Terminated);
            }

            let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
            match name {
                "capabilities" => {
                    output.write_all(b"connect\n\n").await?;
                    output.flush().await?;
                }
                "connect" => {
                    let service = Service::parse(arg.trim());
                    if !self.policy.authorize(&service) {
                        tracing::info!(service = %service, "Connect refused");
                        return Ok(BridgeOutcome::Refused { service });
                    }
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                    return self.connect(service, reader, output, errors).await;
                }
                other => tracing::debug!(command = %other, "Ignoring unsupported command"),
            }
        }
    }

    async fn connect<R, W, E>(
        &self,
        service: Service,
        input: BufReader<R>,
        output: &mut W,
        errors: &mut E,
    ) -> Result<BridgeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        tracing::debug!(service = %service, path = %self.bare_path.display(), "Spawning transport");

        let mut cmd = Command::new(service.program());
        cmd.arg(&self.bare_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for var in REPOSITORY_ENV {
            cmd.env_remove(var);
        }
        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            program: service.program().to_string(),
            source,
        })?;

        let (Some(child_in), Some(child_out), Some(child_err)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(std::io::Error::other("child pipes unavailable").into());
        };

        let mut scanner = MarkerScanner::new(UNPACK_OK);
        let status = {
            let feed = forward_input(input, child_in);
            let drain = async {
                let (out, err) = tokio::join!(
                    pump(child_out, output, Some(&mut scanner)),
                    pump(child_err, errors, None),
                );
                out?;
                err?;
                child.wait().await
            };
            tokio::pin!(feed, drain);

            tokio::select! {
                status = &mut drain => status?,
                () = &mut feed => drain.await?,
            }
        };

        let exit_code = status.code();
        tracing::debug!(service = %service, exit_code = ?exit_code, "Transport exited");
        Ok(BridgeOutcome::Connected {
            service,
            exit_code,
            objects_received: scanner.found(),
        })
    }
}

/// Copies client input into the child until either side closes.
///
/// The child's standard input is dropped on return so the child sees end of
/// input.
async fn forward_input<R, W>(mut input: R, mut child_in: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut input, &mut child_in).await {
        Ok(bytes) => tracing::trace!(bytes, "Client input closed"),
        Err(e) => tracing::debug!(error = %e, "Input forwarding stopped"),
    }
    let _ = child_in.shutdown().await;
}

async fn pump<R, W>(mut from: R, to: &mut W, mut scanner: Option<&mut MarkerScanner>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER];
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            return to.flush().await;
        }
        if let Some(scanner) = scanner.as_deref_mut() {
            scanner.observe(&buf[..n]);
        }
        to.write_all(&buf[..n]).await?;
        to.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        allow: bool,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(allow: bool) -> Self {
            Self {
                allow,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ConnectPolicy for Counting {
        fn authorize(&self, _service: &Service) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.allow
        }
    }

    async fn session(bare_path: &str, input: &[u8]) -> (Result<BridgeOutcome>, String, String) {
        let policy = AllowAll;
        let bridge = Bridge::new(bare_path, &policy);
        let mut output = Vec::new();
        let mut errors = Vec::new();
        let outcome = bridge.run(input, &mut output, &mut errors).await;
        (
            outcome,
            String::from_utf8(output).unwrap(),
            String::from_utf8(errors).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_blank_line_terminates_without_spawning() {
        let policy = Counting::new(true);
        let bridge = Bridge::new("/nonexistent", &policy);
        let mut output = Vec::new();
        let mut errors = Vec::new();

        let outcome = bridge.run(&b"\n"[..], &mut output, &mut errors).await.unwrap();

        assert_eq!(outcome, BridgeOutcome::Terminated);
        assert!(output.is_empty());
        assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_end_of_input_terminates() {
        let (outcome, output, _) = session("/nonexistent", b"").await;
        assert_eq!(outcome.unwrap(), BridgeOutcome::Terminated);
        assert_eq!(output, "");
    }

    #[tokio::test]
    async fn test_capabilities_then_blank() {
        let (outcome, output, _) = session("/nonexistent", b"capabilities\n\n").await;
        assert_eq!(outcome.unwrap(), BridgeOutcome::Terminated);
        assert_eq!(output, "connect\n\n");
    }

    #[tokio::test]
    async fn test_unknown_commands_are_ignored() {
        let (outcome, output, _) = session("/nonexistent", b"option verbosity 1\nlist\n\n").await;
        assert_eq!(outcome.unwrap(), BridgeOutcome::Terminated);
        assert_eq!(output, "");
    }

    #[tokio::test]
    async fn test_connect_replies_then_pipes_child_output() {
        let (outcome, output, _) = session("unpack ok", b"capabilities\nconnect echo\n").await;

        assert_eq!(output, "connect\n\n\nunpack ok\n");
        assert_eq!(
            outcome.unwrap(),
            BridgeOutcome::Connected {
                service: Service::Other("echo".to_string()),
                exit_code: Some(0),
                objects_received: true,
            }
        );
    }

    #[tokio::test]
    async fn test_client_input_reaches_child() {
        let (outcome, output, _) = session("-", b"connect cat\n0009hello\n0000").await;

        assert_eq!(output, "\n0009hello\n0000");
        let BridgeOutcome::Connected {
            exit_code,
            objects_received,
            ..
        } = outcome.unwrap()
        else {
            panic!("expected a connected session");
        };
        assert_eq!(exit_code, Some(0));
        assert!(!objects_received);
    }

    #[tokio::test]
    async fn test_child_stderr_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("transport.sh");
        std::fs::write(&script, "echo 'remote: progress' >&2\n").unwrap();

        let (outcome, output, errors) =
            session(script.to_str().unwrap(), b"connect sh\n").await;

        assert!(outcome.is_ok());
        assert_eq!(output, "\n");
        assert_eq!(errors, "remote: progress\n");
    }

    #[tokio::test]
    async fn test_child_exit_code_is_reported() {
        let (outcome, _, _) = session("/nonexistent", b"connect false\n").await;
        let BridgeOutcome::Connected { exit_code, .. } = outcome.unwrap() else {
            panic!("expected a connected session");
        };
        assert_eq!(exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_refused_connect_spawns_nothing() {
        let policy = Counting::new(false);
        let bridge = Bridge::new("/nonexistent", &policy);
        let mut output = Vec::new();
        let mut errors = Vec::new();

        let outcome = bridge
            .run(&b"capabilities\nconnect git-receive-pack\n"[..], &mut output, &mut errors)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BridgeOutcome::Refused {
                service: Service::ReceivePack
            }
        );
        assert_eq!(output, b"connect\n\n");
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let (outcome, output, _) = session("/nonexistent", b"connect permagit-no-such-transport\n").await;
        assert!(matches!(outcome, Err(BridgeError::Spawn { .. })));
        assert_eq!(output, "\n");
    }

    #[test]
    fn test_service_parse() {
        assert_eq!(Service::parse("git-upload-pack"), Service::UploadPack);
        assert_eq!(Service::parse("git-receive-pack"), Service::ReceivePack);
        assert_eq!(Service::parse("git-upload-archive").program(), "git-upload-archive");
    }
}
