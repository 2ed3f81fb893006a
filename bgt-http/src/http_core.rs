use std::mem;

use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tracing::{debug, instrument, warn};

use bgt_config::types::Request;
use bgt_search::{Outcome, QueryExecutor};
use bgt_storage::Store;

use crate::help::help_page;
use crate::{HttpError, Result, convert_to_query};

/// Streamed responses are sent in pieces of at least this many bytes.
const BATCH_SIZE: usize = 64 * 1024;

/// The number of batches buffered ahead of the client.
const CHANNEL_CAPACITY: usize = 16;

/// A successful response, before it is turned into framework types.
#[derive(Debug)]
pub enum QueryResponse {
  /// The help page, for a request without parameters.
  Help(String),
  /// Nothing matched, with the reason.
  NoContent(String),
  /// A complete response.
  Text(String),
  /// A response streamed from the scan of a session.
  Stream(mpsc::Receiver<String>),
}

/// Answer a request. Translation errors are returned before any session is opened. Once a
/// session is prepared the response is streamed: the scan runs on the blocking pool and stops
/// when the receiver is dropped.
#[instrument(level = "debug", skip_all, err)]
pub async fn query<S: Store>(executor: QueryExecutor<S>, request: Request) -> Result<QueryResponse> {
  if request.params().is_empty() {
    return Ok(QueryResponse::Help(help_page(
      executor.store(),
      executor.limits(),
      request.host(),
    )));
  }

  let query = convert_to_query(request.params(), executor.limits())?;
  debug!(query = ?query, "translated query");

  let (setup_tx, setup_rx) = oneshot::channel();
  let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

  task::spawn_blocking(move || {
    let execution = match executor.execute(&query) {
      Ok(Outcome::Ready(execution)) => execution,
      Ok(Outcome::NoContent(message)) => {
        let _ = setup_tx.send(Ok(QueryResponse::NoContent(message)));
        return;
      }
      Ok(Outcome::Complete(text)) => {
        let _ = setup_tx.send(Ok(QueryResponse::Text(text)));
        return;
      }
      Err(err) => {
        let _ = setup_tx.send(Err(HttpError::from(err)));
        return;
      }
    };

    if setup_tx.send(Ok(QueryResponse::Stream(rx))).is_err() {
      return;
    }

    let mut batch = String::new();
    let result = execution.run(|chunk| {
      batch.push_str(&chunk);
      if batch.len() < BATCH_SIZE {
        return true;
      }

      tx.blocking_send(mem::take(&mut batch)).is_ok()
    });

    match result {
      Ok(()) if !batch.is_empty() => {
        let _ = tx.blocking_send(batch);
      }
      Ok(()) => {}
      Err(err) => warn!(error = %err, "scan failed after the response started"),
    }
  });

  setup_rx
    .await
    .map_err(|err| HttpError::InternalError(format!("query task ended early: {err}")))?
}
