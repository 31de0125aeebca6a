use crate::errors::{new_io_error, Result};
use crate::request::Destination;
use socket2::Socket as RawSocket;
use socket2::{Domain, Protocol, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};

/// ConnectorBuilder
#[derive(Clone, Debug)]
pub struct ConnectorBuilder {
  read_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
  connect_timeout: Option<Duration>,
  nodelay: bool,
  keepalive: bool,
}

impl Default for ConnectorBuilder {
  fn default() -> Self {
    Self {
      read_timeout: Some(Duration::from_secs(30)),
      write_timeout: Some(Duration::from_secs(30)),
      connect_timeout: Some(Duration::from_secs(10)),
      nodelay: false,
      keepalive: false,
    }
  }
}

impl ConnectorBuilder {
  /// Set that all sockets have `SO_NODELAY` set to the supplied value `nodelay`.
  ///
  /// Default is `false`.
  pub fn nodelay(mut self, value: bool) -> ConnectorBuilder {
    self.nodelay = value;
    self
  }
  /// Sets value for the `SO_KEEPALIVE` option on this socket.
  ///
  /// Default is `false`.
  pub fn keepalive(mut self, value: bool) -> ConnectorBuilder {
    self.keepalive = value;
    self
  }
  /// Enables a read timeout.
  ///
  /// The timeout applies to each read operation while parsing a response.
  ///
  /// Default is 30 seconds.
  pub fn read_timeout(mut self, timeout: Option<Duration>) -> ConnectorBuilder {
    self.read_timeout = timeout;
    self
  }
  /// Enables a write timeout.
  ///
  /// Default is 30 seconds.
  pub fn write_timeout(mut self, timeout: Option<Duration>) -> ConnectorBuilder {
    self.write_timeout = timeout;
    self
  }
  /// Set a timeout for only the connect phase.
  ///
  /// Default is 10 seconds.
  pub fn connect_timeout(mut self, timeout: Option<Duration>) -> ConnectorBuilder {
    self.connect_timeout = timeout;
    self
  }
  /// Create a `Connector` with this configuration.
  pub fn build(&self) -> Result<Connector> {
    Ok(Connector {
      connect_timeout: self.connect_timeout,
      nodelay: self.nodelay,
      keepalive: self.keepalive,
      read_timeout: self.read_timeout,
      write_timeout: self.write_timeout,
    })
  }
}

/// Opens plain TCP connections to real destinations.
#[derive(Clone, Debug)]
pub struct Connector {
  connect_timeout: Option<Duration>,
  nodelay: bool,
  keepalive: bool,
  read_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
}

impl Default for Connector {
  fn default() -> Self {
    Connector {
      connect_timeout: Some(Duration::from_secs(10)),
      nodelay: false,
      keepalive: false,
      read_timeout: Some(Duration::from_secs(30)),
      write_timeout: Some(Duration::from_secs(30)),
    }
  }
}

impl Connector {
  /// Timeout applied to each read of a response.
  pub fn read_timeout(&self) -> Option<Duration> {
    self.read_timeout
  }
  /// Connect to a remote endpoint with addr
  pub async fn connect_with_addr<S: Into<SocketAddr>>(&self, addr: S) -> Result<TcpStream> {
    let addr = addr.into();
    let raw_socket = RawSocket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    raw_socket.set_nonblocking(true)?;
    if self.keepalive {
      raw_socket.set_keepalive(true)?;
    }
    let socket = TcpSocket::from_std_stream(raw_socket.into());
    if self.nodelay {
      socket.set_nodelay(true)?;
    }
    let s = match self.connect_timeout {
      None => socket.connect(addr).await?,
      Some(timeout) => tokio::time::timeout(timeout, socket.connect(addr))
        .await
        .map_err(|_| new_io_error(std::io::ErrorKind::TimedOut, "connect timed out"))??,
    };
    Ok(s)
  }
  /// Resolve the destination and connect to the first address that answers.
  pub async fn connect(&self, destination: &Destination) -> Result<TcpStream> {
    let addrs = tokio::net::lookup_host((destination.host(), destination.port())).await?;
    let mut last_err = None;
    for addr in addrs {
      match self.connect_with_addr(addr).await {
        Ok(s) => return Ok(s),
        Err(err) => {
          tracing::debug!(%addr, %err, "connect attempt failed");
          last_err = Some(err);
        }
      }
    }
    Err(last_err.unwrap_or_else(|| {
      new_io_error(
        std::io::ErrorKind::NotFound,
        &format!("no address found for {destination}"),
      )
    }))
  }
  /// Write the whole buffer, bounded by the write timeout.
  pub async fn write_all(&self, stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    let write = async {
      stream.write_all(buf).await?;
      stream.flush().await
    };
    match self.write_timeout {
      None => write.await?,
      Some(t) => tokio::time::timeout(t, write)
        .await
        .map_err(|_| new_io_error(std::io::ErrorKind::TimedOut, "write timed out"))??,
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn connect_and_write() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connector = ConnectorBuilder::default().nodelay(true).build().unwrap();
    let accept = tokio::spawn(async move {
      let (mut s, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 4];
      tokio::io::AsyncReadExt::read_exact(&mut s, &mut buf).await.unwrap();
      buf
    });
    let mut stream = connector
      .connect(&Destination::new("127.0.0.1", port))
      .await
      .unwrap();
    connector.write_all(&mut stream, b"ping").await.unwrap();
    assert_eq!(&accept.await.unwrap(), b"ping");
  }

  #[tokio::test]
  async fn refused_connection_is_an_io_error() {
    // bind then drop to get a port nobody listens on
    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };
    let err = Connector::default()
      .connect(&Destination::new("127.0.0.1", port))
      .await
      .unwrap_err();
    assert!(matches!(err, crate::Error::IO(_)));
  }
}
