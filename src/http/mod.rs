//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (assign x-request-id)
//!     → middleware/security_headers.rs (stamp header set on the response)
//!     → CORS (tower-http, live origin list)
//!     → middleware/rate_limit.rs (state-changing methods, 429)
//!     → middleware/csrf.rs (state-changing methods, 403)
//!     → handlers.rs or the application router
//!     → response.rs (JSON rejection bodies)
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::CsrfTokenResponse;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::ErrorBody;
pub use server::{HttpServer, ShieldState};
