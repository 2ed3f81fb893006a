use axum::extract::{RawQuery, State};
use axum::response::Response;
use http::HeaderMap;

use bgt_http::query;
use bgt_storage::Store;

use crate::handlers::{extract_request, handle_response};
use crate::server::AppState;

/// GET request at the root.
pub async fn get<S: Store>(
  RawQuery(raw_query): RawQuery,
  headers: HeaderMap,
  State(app_state): State<AppState<S>>,
) -> Response {
  let request = extract_request(raw_query.as_deref(), None, &headers);

  handle_response(query(app_state.executor, request).await)
}

/// POST request at the root, with parameters in a form body.
pub async fn post<S: Store>(
  RawQuery(raw_query): RawQuery,
  headers: HeaderMap,
  State(app_state): State<AppState<S>>,
  body: String,
) -> Response {
  let request = extract_request(raw_query.as_deref(), Some(&body), &headers);

  handle_response(query(app_state.executor, request).await)
}
