//! Testing functionality shared by the server implementations.
//!

pub mod server;

use async_trait::async_trait;
use bgt_config::config::Config;
use bgt_config::config::collection::CollectionConfig;
use bgt_config::config::limits::Limits;
use bgt_config::config::server::ServerConfig;
use http::{HeaderMap, HeaderName, Method};

/// Represents a http header.
#[derive(Debug)]
pub struct Header<K, V> {
  pub name: K,
  pub value: V,
}

impl<K: Into<HeaderName>, V: Into<http::HeaderValue>> Header<K, V> {
  pub fn into_tuple(self) -> (HeaderName, http::HeaderValue) {
    (self.name.into(), self.value.into())
  }
}

/// Represents a http response.
#[derive(Debug)]
pub struct Response {
  pub status: u16,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Get the body as text.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Check if status code is success.
  pub fn is_success(&self) -> bool {
    300 > self.status && self.status >= 200
  }
}

/// Mock request trait that should be implemented to use test functions.
pub trait TestRequest {
  fn insert_header(
    self,
    header: Header<impl Into<HeaderName>, impl Into<http::HeaderValue>>,
  ) -> Self;
  fn set_payload(self, payload: impl Into<String>) -> Self;
  fn uri(self, uri: impl Into<String>) -> Self;
  fn method(self, method: impl Into<Method>) -> Self;
}

/// Mock server trait that should be implemented to use test functions.
#[async_trait(?Send)]
pub trait TestServer<T: TestRequest> {
  fn get_config(&self) -> &Config;
  fn request(&self) -> T;
  async fn test_server(&self, request: T) -> Response;
}

/// A config serving the test collection with the given limits.
pub fn test_config(collection: CollectionConfig, limits: Limits) -> Config {
  Config::new(
    Default::default(),
    ServerConfig::new(
      "127.0.0.1:0"
        .parse()
        .expect("expected valid address"),
    ),
    collection,
    limits,
  )
}
