//! Serves the CSI gRPC services on a unix domain socket.

use libvirt_csi_proto::{controller_services, node_services, ControllerService, NodeService};
use std::{
  io,
  path::Path,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};
use tokio::{
  io::{AsyncRead, AsyncWrite, ReadBuf},
  net::UnixListener,
  signal::unix::{signal, SignalKind},
};
use tokio_stream::{wrappers::UnixListenerStream, Stream, StreamExt};
use tonic::transport::{server::Connected, Server};
use tracing::{info, warn};

/// A connection accepted on the plugin socket.
#[derive(Debug)]
pub struct UnixStream(pub tokio::net::UnixStream);

impl Connected for UnixStream {
  fn remote_addr(&self) -> Option<std::net::SocketAddr> {
    None
  }
}

impl AsyncRead for UnixStream {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_read(cx, buf)
  }
}

impl AsyncWrite for UnixStream {
  fn poll_write(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.0).poll_write(cx, buf)
  }

  fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_flush(cx)
  }

  fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_shutdown(cx)
  }
}

/// Binds `socket`, replacing a socket file left behind by an earlier run.
pub fn bind(socket: &Path) -> io::Result<impl Stream<Item = io::Result<UnixStream>>> {
  match std::fs::remove_file(socket) {
    Ok(()) => info!(socket = %socket.display(), "removed stale socket"),
    Err(e) if e.kind() == io::ErrorKind::NotFound => (),
    Err(e) => warn!(socket = %socket.display(), error = %e, "failed to remove existing socket"),
  }

  let listener = UnixListener::bind(socket)?;
  info!(socket = %socket.display(), "listening");

  Ok(UnixListenerStream::new(listener).map(|stream| stream.map(UnixStream)))
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
  let mut terminate = match signal(SignalKind::terminate()) {
    Ok(terminate) => terminate,
    Err(e) => {
      warn!(error = %e, "cannot listen for SIGTERM");
      let _ = tokio::signal::ctrl_c().await;
      return;
    }
  };

  tokio::select! {
    _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
    _ = terminate.recv() => info!("received SIGTERM, shutting down"),
  }
}

pub async fn serve_controller<T: ControllerService>(
  socket: &Path,
  service: Arc<T>,
) -> anyhow::Result<()> {
  let (identity, controller) = controller_services(service);
  let incoming = bind(socket)?;

  Server::builder()
    .add_service(identity)
    .add_service(controller)
    .serve_with_incoming_shutdown(incoming, shutdown_signal())
    .await?;

  Ok(())
}

pub async fn serve_node<T: NodeService>(
  socket: &Path,
  service: Arc<T>,
) -> anyhow::Result<()> {
  let (identity, node) = node_services(service);
  let incoming = bind(socket)?;

  Server::builder()
    .add_service(identity)
    .add_service(node)
    .serve_with_incoming_shutdown(incoming, shutdown_signal())
    .await?;

  Ok(())
}
