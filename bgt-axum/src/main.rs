use tracing::debug;

use bgt_axum::server::join_handle;
use bgt_config::command;
use bgt_config::config::Config;

#[tokio::main]
async fn main() -> std::io::Result<()> {
  if let Some(config) = Config::parse_args_with_command(command!())? {
    config.setup_tracing()?;

    debug!(config = ?config, "config parsed");

    join_handle(config).await?.await??;
  }

  Ok(())
}
