//! SSH implementation of the remote gateway.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{load_secret_key, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::config::SshConfig;
use crate::error::GatewayError;
use crate::{CommandOutput, Connector, RemoteGateway};

/// Gateway executing commands over an SSH session.
pub struct SshGateway {
    config: SshConfig,
    session: Mutex<Option<Handle<SshHandler>>>,
}

impl SshGateway {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: Mutex::default(),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    async fn authenticate(&self, session: &mut Handle<SshHandler>) -> Result<(), GatewayError> {
        let user = &self.config.user;
        if let Some(path) = &self.config.key_path {
            let path = expand_home(path);
            let key = load_secret_key(&path, None).map_err(|source| GatewayError::Key {
                path: path.clone(),
                source,
            })?;
            let hash_alg = matches!(key.algorithm(), ssh_key::Algorithm::Rsa { .. })
                .then_some(ssh_key::HashAlg::Sha512);
            let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg)
                .map_err(|source| GatewayError::Key { path, source })?;
            if session.authenticate_publickey(user, key).await? {
                return Ok(());
            }
            debug!(user = %user, "public key authentication rejected");
        }
        if let Some(password) = self.config.password.as_deref().filter(|pw| !pw.is_empty()) {
            if session.authenticate_password(user, password).await? {
                return Ok(());
            }
            debug!(user = %user, "password authentication rejected");
        }
        if self.config.has_auth_method() {
            Err(GatewayError::Auth { user: user.clone() })
        } else {
            Err(GatewayError::NoAuthMethod { user: user.clone() })
        }
    }
}

#[async_trait]
impl RemoteGateway for SshGateway {
    async fn connect(&self, deadline: Instant) -> Result<(), GatewayError> {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(|session| !session.is_closed()) {
            return Ok(());
        }
        let address = self.config.address();
        let deadline = deadline.min(Instant::now() + self.config.connect_timeout);
        let config = Arc::new(russh::client::Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        });
        debug!(address = %address, "connecting via SSH");
        let connect = russh::client::connect(
            config,
            (self.config.host.as_str(), self.config.port),
            SshHandler,
        );
        let mut session = match time::timeout_at(deadline, connect).await {
            Ok(Ok(session)) => session,
            Ok(Err(GatewayError::Ssh(source))) => {
                return Err(GatewayError::Connect { address, source })
            }
            Ok(Err(error)) => return Err(error),
            Err(_) => return Err(GatewayError::ConnectTimedOut { address }),
        };
        time::timeout_at(deadline, self.authenticate(&mut session))
            .await
            .map_err(|_| GatewayError::ConnectTimedOut { address })??;
        *slot = Some(session);
        Ok(())
    }

    async fn execute(
        &self,
        command: &str,
        deadline: Instant,
    ) -> Result<CommandOutput, GatewayError> {
        let channel = match &*self.session.lock().await {
            Some(session) => session.channel_open_session().await?,
            None => return Err(GatewayError::NotConnected),
        };
        let mut channel = ExecChannel::new(channel);
        channel.exec(command).await?;
        match time::timeout_at(deadline, channel.collect()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(host = %self.config.host, "remote command timed out");
                Err(GatewayError::TimedOut)
            }
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        if session.is_closed() {
            return Ok(());
        }
        session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

/// Connector opening [`SshGateway`]s.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        host_id: &str,
        config: &SshConfig,
        deadline: Instant,
    ) -> Result<Arc<dyn RemoteGateway>, GatewayError> {
        let gateway = SshGateway::new(config.clone());
        gateway.connect(deadline).await?;
        debug!(host_id, address = %config.address(), "connected");
        Ok(Arc::new(gateway))
    }
}

/// Session channel running a single command.
///
/// Dropping the channel before the command exited kills the remote command.
struct ExecChannel {
    channel: Option<Channel<Msg>>,
    exited: bool,
}

impl ExecChannel {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel: Some(channel),
            exited: false,
        }
    }

    async fn exec(&mut self, command: &str) -> Result<(), GatewayError> {
        let Some(channel) = &self.channel else {
            return Err(GatewayError::Disconnected);
        };
        channel.exec(true, command).await?;
        // Commands do not get any input.
        channel.eof().await?;
        Ok(())
    }

    async fn collect(&mut self) -> Result<CommandOutput, GatewayError> {
        let Some(channel) = &mut self.channel else {
            return Err(GatewayError::Disconnected);
        };
        let mut output = Vec::new();
        let mut code = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } | ChannelMsg::ExtendedData { ref data, .. } => {
                    output.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    code = Some(i32::try_from(exit_status).unwrap_or(-1));
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!("remote command terminated by signal {signal_name:?}");
                    code = Some(-1);
                }
                _ => {}
            }
        }
        self.exited = code.is_some();
        match code {
            Some(exit_code) => Ok(CommandOutput {
                output: String::from_utf8_lossy(&output).into_owned(),
                exit_code,
            }),
            None => Err(GatewayError::Disconnected),
        }
    }
}

impl Drop for ExecChannel {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        if self.exited {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = channel.signal(Sig::KILL).await;
                let _ = channel.close().await;
            });
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

struct SshHandler;

#[async_trait]
impl russh::client::Handler for SshHandler {
    type Error = GatewayError;

    async fn check_server_key(&mut self, _: &ssh_key::PublicKey) -> Result<bool, Self::Error> {
        // Benchmark hosts are addressed by configuration, not by known hosts.
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        let path = PathBuf::from("/etc/ssh/key");
        assert_eq!(expand_home(&path), path);
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.ssh/id_rsa")),
                PathBuf::from(home).join(".ssh/id_rsa")
            );
        }
    }

    #[tokio::test]
    async fn test_not_connected() {
        let gateway = SshGateway::new(SshConfig::new("127.0.0.1", "root"));
        let deadline = Instant::now() + Duration::from_secs(1);
        assert!(matches!(
            gateway.execute("true", deadline).await,
            Err(GatewayError::NotConnected)
        ));
        gateway.close().await.unwrap();
        gateway.close().await.unwrap();
    }
}
