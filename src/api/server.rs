//! Process lifecycle: load models, start the logger, serve, then tear down.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};
use warp::Filter;

use crate::common::config::AppCfg;
use crate::common::error::{ServeError, ServeResult};
use crate::inference::domain::ModelStore;
use crate::inference::workers::{LoggerStats, PredictionLogger};
use crate::training::repo_fs::FsModelRepo;

use super::http::{handle_rejection, routes, AppState};

/// A bound server that has not started accepting connections yet.
pub struct Server {
    addr: SocketAddr,
    store: Arc<ModelStore>,
    logger: PredictionLogger,
    running: Pin<Box<dyn Future<Output = ()>>>,
}

impl Server {
    /// Load the configured models, spawn the prediction logger and bind the
    /// listener. Must be called inside a tokio runtime.
    ///
    /// The server stops accepting connections once `shutdown` resolves.
    pub fn bind<F>(cfg: &AppCfg, shutdown: F) -> ServeResult<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let store = Arc::new(ModelStore::from_config(cfg, &FsModelRepo::new()));
        let logger = PredictionLogger::spawn(
            cfg.predictions_path.clone(),
            cfg.log_delay,
            cfg.log_queue,
        );

        let state = AppState {
            store: store.clone(),
            logger: logger.handle(),
        };
        let api = routes(state)
            .recover(handle_rejection)
            .with(warp::trace::request());

        let (addr, running) = warp::serve(api)
            .try_bind_with_graceful_shutdown(cfg.bind_addr, shutdown)
            .map_err(|e| ServeError::Server(format!("bind {}: {e}", cfg.bind_addr)))?;

        Ok(Self {
            addr,
            store,
            logger,
            running: Box::pin(running),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the shutdown signal fires, flush the prediction log and
    /// release the models.
    pub async fn run(self) -> LoggerStats {
        let Server {
            addr,
            store,
            logger,
            running,
        } = self;

        info!(%addr, models = ?store.names(), "listening");
        running.await;
        info!("server stopped, flushing prediction log");

        let stats = logger.shutdown().await;
        match Arc::try_unwrap(store) {
            Ok(mut store) => {
                store.clear();
                info!("models unloaded");
            }
            Err(_) => debug!("model store still shared at exit"),
        }
        stats
    }
}

/// Bind to `cfg.bind_addr` and serve until `shutdown` resolves.
pub async fn serve<F>(cfg: AppCfg, shutdown: F) -> ServeResult<LoggerStats>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = Server::bind(&cfg, shutdown)?;
    Ok(server.run().await)
}
