//! Network listeners.
//!
//! One accept loop per configured port; each accepted connection is served
//! on its own task so a blocked dispatch only ever stalls its own socket.
//! Close outcomes surface as service errors, which abort the connection
//! without writing a response.

pub mod tls;

use crate::config::ServerConfig;
use crate::control::ControlRouter;
use crate::dispatch::{ActionDispatcher, ConnectionContext};
use crate::state::StateHandler;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Build the router shared by all listeners.
pub fn build_router(config: &ServerConfig, state: Arc<StateHandler>) -> Arc<ControlRouter> {
    let dispatcher = ActionDispatcher::new(
        config.mode,
        config.forward_timeout(),
        config.callback_timeout(),
    );
    Arc::new(ControlRouter::new(state, dispatcher, config.bound_ports()))
}

/// Bind every configured listener and serve until the process exits.
pub async fn serve(config: ServerConfig, state: Arc<StateHandler>) -> Result<(), anyhow::Error> {
    let router = build_router(&config, state);

    let plain_listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, mode = ?config.mode, "listening");

    let tls_task = if let Some(tls_config) = &config.tls {
        let issuer = Arc::new(tls::FileCertificateIssuer::from_pem_files(
            &tls_config.cert_path,
            &tls_config.key_path,
        )?);
        let cache = Arc::new(tls::CertificateCache::new(issuer));
        let acceptor = tls::create_tls_acceptor(cache);
        let listener = TcpListener::bind(("0.0.0.0", tls_config.port)).await?;
        info!(port = tls_config.port, "listening (tls)");

        let router = Arc::clone(&router);
        Some(tokio::spawn(accept_tls_loop(listener, acceptor, router)))
    } else {
        None
    };

    accept_loop(plain_listener, router).await;
    if let Some(task) = tls_task {
        task.abort();
    }
    Ok(())
}

async fn accept_loop(listener: TcpListener, router: Arc<ControlRouter>) {
    loop {
        match listener.accept().await {
            Ok((stream, client_address)) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |request| {
                        let router = Arc::clone(&router);
                        let ctx = ConnectionContext {
                            client_address: Some(client_address),
                            secure: false,
                        };
                        async move { router.route(request, ctx).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("connection ended: {e}");
                    }
                });
            }
            Err(e) => {
                error!("accept failed: {e}");
            }
        }
    }
}

async fn accept_tls_loop(
    listener: TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
    router: Arc<ControlRouter>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, client_address)) => {
                let acceptor = acceptor.clone();
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(e) => {
                            debug!("tls handshake failed: {e}");
                            return;
                        }
                    };
                    let io = TokioIo::new(tls_stream);
                    let service = service_fn(move |request| {
                        let router = Arc::clone(&router);
                        let ctx = ConnectionContext {
                            client_address: Some(client_address),
                            secure: true,
                        };
                        async move { router.route(request, ctx).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("tls connection ended: {e}");
                    }
                });
            }
            Err(e) => {
                error!("tls accept failed: {e}");
            }
        }
    }
}
