//! Stamps the security header set onto every response.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::ShieldState;

pub async fn security_headers_middleware(
    State(state): State<ShieldState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    state.headers.apply(response.headers_mut());
    response
}
