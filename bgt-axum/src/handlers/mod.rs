use std::convert::Infallible;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bgt_http::{QueryResponse, Request, parse_params};
use bgt_config::types::Params;
use futures::stream;
use http::{HeaderMap, StatusCode, header};
use tracing::debug;

use crate::error::HttpError;

pub mod query;

/// Handles a response, converting errors to text with the proper status code and streaming
/// scanned records as they arrive.
fn handle_response(response: bgt_http::Result<QueryResponse>) -> Response {
  match response {
    Err(error) => HttpError(error).into_response(),
    Ok(QueryResponse::Help(text)) | Ok(QueryResponse::Text(text)) => {
      (StatusCode::OK, text).into_response()
    }
    Ok(QueryResponse::NoContent(message)) => {
      debug!(message, "no content");
      StatusCode::NO_CONTENT.into_response()
    }
    Ok(QueryResponse::Stream(rx)) => {
      let batches = stream::unfold(rx, |mut rx| async move {
        rx.recv()
          .await
          .map(|batch| (Ok::<_, Infallible>(batch), rx))
      });

      (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(batches),
      )
        .into_response()
    }
  }
}

/// Build a request from the raw query string, an optional form body and the `Host` header.
/// The query string and the body are split separately, so that `&&` is protected in both.
fn extract_request(raw_query: Option<&str>, body: Option<&str>, headers: &HeaderMap) -> Request {
  let query = parse_params(raw_query.unwrap_or_default());
  let body = parse_params(body.unwrap_or_default());

  let params = query.iter().chain(body.iter()).collect::<Params>();
  let host = headers
    .get(header::HOST)
    .and_then(|host| host.to_str().ok())
    .map(str::to_string);

  Request::new(params, host)
}
