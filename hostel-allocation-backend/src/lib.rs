pub mod error;
pub mod permission;
pub mod routes;
pub mod session;

use core::convert::Infallible;
use core::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use cookie::Key;
use error::AppError;
use futures_util::pin_mut;
use hostel_allocation_config::Config;
use hostel_allocation_database::{
    get_database_connection, run_migrations, HostelStore, MemoryStore, PgStore,
};
use http::{Request, Response};
use http_body::Body;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use session::{ResponseSessionExt as _, Session};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument as _};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn HostelStore>,
    cookie_key: Key,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn HostelStore>, cookie_key: Key) -> Self {
        Self { store, cookie_key }
    }

    #[must_use]
    pub fn store(&self) -> &dyn HostelStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn cookie_key(&self) -> &Key {
        &self.cookie_key
    }
}

/// The key shared with the login gateway, or a random one nobody else knows.
pub fn cookie_key(config: &Config) -> Result<Key, AppError> {
    if let Some(secret) = &config.cookie_key {
        return Ok(Key::try_from(secret.as_bytes())?);
    }
    warn!("no cookie_key configured, every profile cookie will be rejected");
    Key::try_generate().ok_or(AppError::NoCookieKey)
}

/// PostgreSQL when a database url is configured, otherwise an in-memory store.
pub async fn setup_store(config: &Config) -> Result<Arc<dyn HostelStore>, AppError> {
    if let Some(database_url) = &config.database_url {
        let pool = get_database_connection(database_url)?;
        if config.run_migrations {
            run_migrations(&pool).await?;
        }
        return Ok(Arc::new(PgStore::new(pool)));
    }
    warn!("no database_url configured, nothing will survive a restart");
    if config.demo_data {
        Ok(Arc::new(MemoryStore::with_demo_data()?))
    } else {
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// Answers one request. Errors become JSON error responses, so this never fails.
pub async fn handle<B>(
    request: Request<B>,
    state: AppState,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<AppError>,
{
    let session = Session::new(&request, state.cookie_key());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let reply = match routes::dispatch(request, &state, &session).await {
        Ok(reply) => reply,
        Err(err) => err.into_reply(),
    };
    debug!(%method, %path, status = reply.status().as_u16(), "handled request");
    Ok(reply.into_response().with_session(&session))
}

/// Serves until `shutdown` resolves, then lets open connections finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()>,
) -> Result<(), AppError> {
    // tell the connections to shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let shutdown_tx = Arc::new(shutdown_tx);

    // wait for the connections to finish shutdown
    let (closed_tx, closed_rx) = watch::channel(());

    pin_mut!(shutdown);

    #[allow(clippy::redundant_pub_crate)]
    loop {
        select! {
            accept = listener.accept() => {
                let (socket, remote_addr) = match accept {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!("failed to accept connection: {err}");
                        continue;
                    }
                };

                let state = state.clone();
                let shutdown_tx = Arc::clone(&shutdown_tx);
                let closed_rx = closed_rx.clone();

                let connection_task = async move {
                    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                        handle(request, state.clone())
                    });
                    let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
                    let connection = builder.serve_connection_with_upgrades(TokioIo::new(socket), service);
                    pin_mut!(connection);

                    let mut shutting_down = false;
                    loop {
                        select! {
                            connection_result = connection.as_mut() => {
                                if let Err(err) = connection_result {
                                    debug!("failed to serve connection: {err:#}");
                                }
                                break;
                            }
                            () = shutdown_tx.closed(), if !shutting_down => {
                                shutting_down = true;
                                connection.as_mut().graceful_shutdown();
                            }
                        }
                    }

                    drop(closed_rx);
                };
                tokio::spawn(connection_task.instrument(info_span!("connection", %remote_addr)));
            }
            () = &mut shutdown => {
                info!("shutting down, waiting for open connections");
                drop(shutdown_rx);
                drop(closed_rx);
                closed_tx.closed().await;
                break;
            }
        }
    }

    info!("server stopped");
    Ok(())
}

pub async fn run_server(config: Config) -> Result<(), AppError> {
    info!("starting up server...");
    let store = setup_store(&config).await?;
    let cookie_key = cookie_key(&config)?;
    let listener = TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "started up server");
    serve(listener, AppState::new(store, cookie_key), shutdown_signal()).await
}

#[allow(clippy::redundant_pub_crate)]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            core::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {err}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
