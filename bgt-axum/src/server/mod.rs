//! The Axum query server.
//!

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use bgt_config::config::Config;
use bgt_config::config::server::ServerConfig;
use bgt_search::QueryExecutor;
use bgt_storage::Store;
use bgt_storage::memory::MemoryStore;
use http::{StatusCode, Uri};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Error::ServerError;
use crate::error::Result;
use crate::handlers::query;

/// Represents the axum app state.
#[derive(Debug)]
pub struct AppState<S> {
  pub(crate) executor: QueryExecutor<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      executor: self.executor.clone(),
    }
  }
}

impl<S: Store> AppState<S> {
  /// Create a new app state.
  pub fn new(executor: QueryExecutor<S>) -> Self {
    Self { executor }
  }
}

/// An axum server which should bind an address.
#[derive(Debug, Clone)]
pub struct BindServer {
  addr: SocketAddr,
}

impl BindServer {
  pub fn new(addr: SocketAddr) -> Self {
    Self { addr }
  }

  /// Eagerly bind the address by returning a `Server`. This function also updates the
  /// address to the actual bound address.
  pub async fn bind_server(&mut self) -> Result<Server> {
    let server = Server::bind_addr(self.addr).await?;
    self.addr = server.local_addr()?;

    Ok(server)
  }

  /// Eagerly bind the address by returning a `QueryServer`.
  pub async fn bind_query_server<S: Store>(
    &mut self,
    executor: QueryExecutor<S>,
  ) -> Result<QueryServer<S>> {
    let server = self.bind_server().await?;

    Ok(QueryServer::new(server, executor))
  }

  /// Get the [SocketAddr] of this server.
  pub fn get_addr(&self) -> SocketAddr {
    self.addr
  }
}

impl From<ServerConfig> for BindServer {
  fn from(config: ServerConfig) -> Self {
    Self::new(config.addr())
  }
}

/// An Axum server.
#[derive(Debug)]
pub struct Server {
  listener: TcpListener,
}

impl Server {
  /// Eagerly bind the address for use with the server, returning any errors.
  pub async fn bind_addr(addr: SocketAddr) -> Result<Server> {
    let listener = TcpListener::bind(addr).await?;

    Ok(Self { listener })
  }

  /// Run the actual server, using the router.
  pub async fn serve(self, app: Router) -> Result<()> {
    axum::serve(self.listener, app)
      .await
      .map_err(|err| ServerError(err.to_string()))
  }

  /// Get the local address the server has bound to.
  pub fn local_addr(&self) -> Result<SocketAddr> {
    Ok(self.listener.local_addr()?)
  }
}

/// The server answering queries at `/`.
#[derive(Debug)]
pub struct QueryServer<S> {
  server: Server,
  executor: QueryExecutor<S>,
}

impl<S: Store> QueryServer<S> {
  /// Create a new query server.
  pub fn new(server: Server, executor: QueryExecutor<S>) -> Self {
    Self { server, executor }
  }

  /// Run the query server.
  pub async fn serve(self) -> Result<()> {
    self.server.serve(Self::router(self.executor)).await
  }

  /// Create the router for the query server.
  pub fn router(executor: QueryExecutor<S>) -> Router {
    Router::default()
      .route("/", get(query::get::<S>).post(query::post::<S>))
      .fallback(Self::fallback)
      .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
      .with_state(AppState::new(executor))
  }

  /// Get the local address the server has bound to.
  pub fn local_addr(&self) -> Result<SocketAddr> {
    self.server.local_addr()
  }

  /// A handler for when a route is not found.
  async fn fallback(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("404 Not Found: no route for {uri}"))
  }
}

/// Open the configured collection and spawn a task to run the query server.
pub async fn join_handle(config: Config) -> Result<JoinHandle<Result<()>>> {
  let store = MemoryStore::open(config.collection())?;
  let executor = QueryExecutor::new(Arc::new(store), config.limits());

  let query_server = BindServer::from(config.server().clone())
    .bind_query_server(executor)
    .await?;

  info!(address = ?query_server.local_addr()?, "query server address bound to");

  Ok(tokio::spawn(async move { query_server.serve().await }))
}
