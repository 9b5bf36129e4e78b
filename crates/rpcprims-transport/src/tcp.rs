use std::io::ErrorKind;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// Bounded retry schedule for outbound connections.
///
/// Backoff doubles after every failed attempt, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total connection attempts (at least one is always made).
    pub attempts: u32,
    /// Delay before the second attempt.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts.
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    /// Timeout for a single connect attempt.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Bind a TCP listener on `addr` (e.g. `"0.0.0.0:7000"`, `"127.0.0.1:0"`).
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local = listener.local_addr()?;
    info!(%local, "listening on tcp socket");
    Ok(listener)
}

/// Connect once to `addr`, bounded by `timeout`.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    match try_connect(addr, timeout).await {
        Ok(stream) => Ok(stream),
        Err(ConnectFailure::Unresolved) => Err(TransportError::Unresolved(addr.to_string())),
        Err(ConnectFailure::Io(source)) => Err(TransportError::Connect {
            addr: addr.to_string(),
            attempts: 1,
            source,
        }),
    }
}

/// Connect to `addr`, retrying according to `policy`.
pub async fn connect_with_retry(addr: &str, policy: &RetryPolicy) -> Result<TcpStream> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match try_connect(addr, policy.connect_timeout).await {
            Ok(stream) => {
                debug!(addr, attempt, "connected");
                return Ok(stream);
            }
            Err(ConnectFailure::Unresolved) => {
                return Err(TransportError::Unresolved(addr.to_string()));
            }
            Err(ConnectFailure::Io(source)) if attempt >= attempts => {
                return Err(TransportError::Connect {
                    addr: addr.to_string(),
                    attempts: attempt,
                    source,
                });
            }
            Err(ConnectFailure::Io(err)) => {
                let delay = policy.backoff_after(attempt);
                warn!(addr, attempt, error = %err, ?delay, "connect failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Apply the socket options every rpcprims connection uses.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}

enum ConnectFailure {
    Unresolved,
    Io(std::io::Error),
}

async fn try_connect(addr: &str, timeout: Duration) -> std::result::Result<TcpStream, ConnectFailure> {
    let addrs: Vec<_> = lookup_host(addr).await.map_err(ConnectFailure::Io)?.collect();
    if addrs.is_empty() {
        return Err(ConnectFailure::Unresolved);
    }

    let mut last_err = None;
    for socket_addr in addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).map_err(ConnectFailure::Io)?;
                return Ok(stream);
            }
            Ok(Err(err)) => last_err = Some(err),
            Err(_) => {
                last_err = Some(std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("connect timed out after {timeout:?}"),
                ))
            }
        }
    }

    Err(ConnectFailure::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(ErrorKind::NotConnected, "no address could be connected")
    })))
}

/// Serde adapter storing a [`Duration`] as integer milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_bind_accept_connect() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = tokio::spawn(async move {
            let mut stream = connect(&addr, Duration::from_secs(1)).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let (mut server, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_address_in_use() {
        let first = bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let result = bind(&addr).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_retry_exhausts_attempts() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let policy = RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
            connect_timeout: Duration::from_millis(200),
        };

        let err = connect_with_retry(&addr, &policy).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_connect_with_retry_succeeds_once_listener_appears() {
        let addr = {
            let listener = bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let bind_addr = addr.clone();
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let listener = bind(&bind_addr).await.unwrap();
            let _ = listener.accept().await.unwrap();
        });

        let policy = RetryPolicy {
            attempts: 20,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
        };
        let stream = connect_with_retry(&addr, &policy).await;
        assert!(stream.is_ok());

        server.await.unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            connect_timeout: Duration::from_secs(1),
        };

        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_after(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_policy_from_json_millis() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"attempts":5,"initial_backoff":50}"#).unwrap();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.max_backoff, RetryPolicy::default().max_backoff);
    }
}
