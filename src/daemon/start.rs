use std::{future::Future, io, sync::Arc};

use log::{error, info};
use tokio::sync::oneshot;

use super::Error;
use crate::{
    ca::CertificateAuthority,
    commons::error::IoError,
    config::Config,
    constants::MESHCA_APP,
    secrets::open_store,
};

/// Opens the secret store and creates the CA for the configured mode.
pub fn bootstrap(config: &Config) -> Result<CertificateAuthority, Error> {
    let store = open_store(&config.storage_uri)?;
    info!("Using secret store: {}", config.storage_uri);

    let options = config.ca_options(store.as_ref())?;
    Ok(CertificateAuthority::new(options)?)
}

/// Runs the daemon on a new tokio runtime until ctrl-c is received.
pub fn start(config: Config) -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| IoError::new("Could not start tokio runtime", e))?;

    runtime.block_on(start_ca_daemon(Arc::new(config), None, ctrl_c()))
}

/// Bootstraps the CA and keeps its liveness reported until `shutdown`
/// completes.
///
/// If given, `signal_running` receives the CA once it is up.
pub async fn start_ca_daemon<F>(
    config: Arc<Config>,
    signal_running: Option<oneshot::Sender<Arc<CertificateAuthority>>>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()>,
{
    // Key generation and secret I/O block.
    let bootstrap_config = config.clone();
    let ca = tokio::task::spawn_blocking(move || bootstrap(&bootstrap_config))
        .await
        .map_err(|e| {
            IoError::new("CA bootstrap task did not complete", io::Error::other(e))
        })?;
    let ca = Arc::new(ca?);

    let status = ca.check_liveness();
    info!("{} CA is {}", MESHCA_APP, status);

    let controller = ca.spawn_liveness_controller();

    if let Some(tx) = signal_running {
        let _ = tx.send(ca.clone());
    }

    shutdown.await;
    info!("Stopping {}", MESHCA_APP);

    if let Some(handle) = controller {
        handle.abort();
        let _ = handle.await;
    }

    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for ctrl-c, run until killed: {}", e);
        std::future::pending::<()>().await;
    }
}

//------------ Tests ---------------------------------------------------------
