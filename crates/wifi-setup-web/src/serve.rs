//! Running the portal router on a TCP listener.

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use wifi_setup_server::{DriverError, PortalServer, Provisioning};

use crate::routes::create_router;

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Portal server backed by axum.
///
/// `start` binds synchronously so address conflicts surface as a start
/// failure. It must be called with a tokio runtime context entered, which
/// holds on the connection manager's blocking pool.
pub struct AxumPortal {
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl AxumPortal {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            local_addr: None,
            running: None,
        }
    }

    /// Address actually bound while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl PortalServer for AxumPortal {
    fn start(&mut self, provisioning: Provisioning) -> Result<(), DriverError> {
        self.stop()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DriverError::Server(format!("no runtime: {}", e)))?;

        let listener = std::net::TcpListener::bind(self.addr)
            .map_err(|e| DriverError::Server(format!("failed to bind {}: {}", self.addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| DriverError::Server(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DriverError::Server(e.to_string()))?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener)
                .map_err(|e| DriverError::Server(e.to_string()))?
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = create_router(provisioning);
        let task = runtime.spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Portal server error: {}", e);
            }
        });

        info!("Portal listening on http://{}", local_addr);
        self.local_addr = Some(local_addr);
        self.running = Some(Running {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            running.task.abort();
            info!("Portal stopped");
        }
        self.local_addr = None;
        Ok(())
    }
}

impl Drop for AxumPortal {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
