//! Configuration of the query server.
//!

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

fn default_addr() -> &'static str {
  "0.0.0.0:8000"
}

/// Configuration for the query server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
  addr: SocketAddr,
}

impl ServerConfig {
  /// Create a new server config.
  pub fn new(addr: SocketAddr) -> Self {
    Self { addr }
  }

  /// Get the addr.
  pub fn addr(&self) -> SocketAddr {
    self.addr
  }

  /// Replace the port of the address.
  pub fn set_port(&mut self, port: u16) {
    self.addr.set_port(port);
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      addr: default_addr().parse().expect("expected valid address"),
    }
  }
}
