use std::{net::SocketAddr, path::Path};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::services::ServeDir;
use tracing::info;

/// Serves a workspace root at `GET /data/<name>` until shut down.
pub struct FileServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl FileServer {
    pub async fn start(root: &Path, listen: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("binding {listen}"))?;
        let addr = listener.local_addr()?;

        let app = Router::new().nest_service("/data", ServeDir::new(root));
        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    rx.await.ok();
                })
                .await
        });

        info!(%addr, root = %root.display(), "serving /data");
        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        self.handle.await.context("file server panicked")??;
        info!(addr = %self.addr, "file server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{naming::StoreName, transfer::Fetcher};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_serves_and_fetches_named_files() {
        let served = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let name = StoreName::MapOutput { map: 0, bucket: 1 };
        std::fs::write(served.path().join(name.to_string()), b"bucket bytes").unwrap();

        let server = FileServer::start(served.path(), "127.0.0.1:0").await.unwrap();
        let addr = server.addr().to_string();
        let dest = local.path().join("copy.db");

        let n = Fetcher::new().fetch(&addr, &name, &dest).await.unwrap();
        assert_eq!(n, 12);
        assert_eq!(std::fs::read(&dest).unwrap(), b"bucket bytes");

        let err = Fetcher::new()
            .fetch(&addr, &StoreName::ReduceOutput(9), &dest)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("404"), "{err:#}");

        server.shutdown().await.unwrap();
    }
}
