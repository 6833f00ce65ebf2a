// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::errors::RotationError;

const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// 匿名网络控制通道
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// 认证，成功后同一连接上的后续命令无需再次认证
    async fn authenticate(&self) -> Result<(), RotationError>;

    /// 请求切换到新线路
    async fn signal_new_identity(&self) -> Result<(), RotationError>;
}

/// Tor控制端口客户端
///
/// 使用文本行协议：`AUTHENTICATE`、`SIGNAL NEWNYM`，成功回复以 `250` 开头。
/// 每次交互（连接、写入、读取回复）都受超时限制。连接只在交互完整结束后
/// 放回，出错、超时或被取消时丢弃，下次命令重新建立。
pub struct TorControlClient {
    addr: String,
    password: Option<String>,
    timeout: Duration,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

impl TorControlClient {
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password,
            timeout: DEFAULT_CONTROL_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn auth_command(&self) -> String {
        match &self.password {
            Some(pw) => format!("AUTHENTICATE \"{}\"\r\n", pw.replace('"', "\\\"")),
            None => "AUTHENTICATE\r\n".to_string(),
        }
    }

    async fn send(
        conn: &mut BufReader<TcpStream>,
        command: &str,
    ) -> Result<(), RotationError> {
        conn.get_mut()
            .write_all(command.as_bytes())
            .await
            .map_err(|e| RotationError::ControlChannel(e.to_string()))?;

        // 多行回复以 "250-" 开头，最后一行为 "250 "
        loop {
            let mut line = String::new();
            let read = conn
                .read_line(&mut line)
                .await
                .map_err(|e| RotationError::ControlChannel(e.to_string()))?;
            if read == 0 {
                return Err(RotationError::ControlChannel("连接已关闭".to_string()));
            }
            let line = line.trim_end();
            if !line.starts_with("250") {
                return Err(RotationError::ControlChannel(line.to_string()));
            }
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok(());
            }
        }
    }

    async fn exchange(
        &self,
        cached: Option<BufReader<TcpStream>>,
        command: &str,
        needs_auth: bool,
    ) -> Result<BufReader<TcpStream>, RotationError> {
        let mut conn = match cached {
            Some(conn) => conn,
            None => {
                let stream = TcpStream::connect(&self.addr)
                    .await
                    .map_err(|e| RotationError::ControlChannel(format!("{}: {}", self.addr, e)))?;
                let mut conn = BufReader::new(stream);
                if needs_auth {
                    Self::send(&mut conn, &self.auth_command()).await?;
                }
                conn
            }
        };
        Self::send(&mut conn, command).await?;
        Ok(conn)
    }

    async fn command(&self, command: &str, needs_auth: bool) -> Result<(), RotationError> {
        let mut guard = self.conn.lock().await;
        // 取出连接：交互未完成时连接随之丢弃，残留的回复不会被下一条命令读到
        let cached = guard.take();

        match tokio::time::timeout(self.timeout, self.exchange(cached, command, needs_auth)).await {
            Ok(Ok(conn)) => {
                *guard = Some(conn);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RotationError::ControlChannel(format!(
                "{}: no reply within {:?}",
                self.addr, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl ControlChannel for TorControlClient {
    async fn authenticate(&self) -> Result<(), RotationError> {
        let command = self.auth_command();
        self.command(&command, false).await
    }

    async fn signal_new_identity(&self) -> Result<(), RotationError> {
        debug!("Sending NEWNYM to {}", self.addr);
        self.command("SIGNAL NEWNYM\r\n", true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// 假的控制端口，记录收到的命令
    async fn fake_controller(password: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let mut authed = false;
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            break;
                        }
                        let line = line.trim_end().to_string();
                        log.lock().await.push(line.clone());
                        let reply = if line.starts_with("AUTHENTICATE") {
                            if line == format!("AUTHENTICATE \"{}\"", password) {
                                authed = true;
                                "250 OK\r\n"
                            } else {
                                "515 Authentication failed\r\n"
                            }
                        } else if line == "SIGNAL NEWNYM" && authed {
                            "250 OK\r\n"
                        } else {
                            "514 Authentication required\r\n"
                        };
                        if reader.get_mut().write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (addr, seen)
    }

    #[tokio::test]
    async fn test_newnym_authenticates_once_per_connection() {
        let (addr, seen) = fake_controller("secret").await;
        let client = TorControlClient::new(addr, Some("secret".to_string()));

        client.authenticate().await.unwrap();
        client.signal_new_identity().await.unwrap();
        client.signal_new_identity().await.unwrap();

        let seen = seen.lock().await.clone();
        assert_eq!(
            seen,
            vec!["AUTHENTICATE \"secret\"", "SIGNAL NEWNYM", "SIGNAL NEWNYM"]
        );
    }

    #[tokio::test]
    async fn test_wrong_password_is_control_channel_error() {
        let (addr, _) = fake_controller("secret").await;
        let client = TorControlClient::new(addr, Some("nope".to_string()));

        let result = client.signal_new_identity().await;
        assert!(matches!(result, Err(RotationError::ControlChannel(msg)) if msg.starts_with("515")));
    }

    #[tokio::test]
    async fn test_unreachable_controller() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = TorControlClient::new(addr, None);
        assert!(matches!(
            client.authenticate().await,
            Err(RotationError::ControlChannel(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_controller_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // 接受连接但从不回复
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = TorControlClient::new(addr, None).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = client.signal_new_identity().await;

        assert!(matches!(result, Err(RotationError::ControlChannel(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_interrupted_exchange_discards_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let accepted = connections.clone();

        // 第一条 NEWNYM 的回复延迟发出，其余立即回复
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let first = accepted.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0;
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            break;
                        }
                        if first && line.trim_end() == "SIGNAL NEWNYM" {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                        }
                        if reader.get_mut().write_all(b"250 OK\r\n").await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        let client = TorControlClient::new(addr, None);
        let interrupted =
            tokio::time::timeout(Duration::from_millis(100), client.signal_new_identity()).await;
        assert!(interrupted.is_err());

        client.signal_new_identity().await.unwrap();
        assert_eq!(connections.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
