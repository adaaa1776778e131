//! # Helpdesk Gateway
//!
//! HTTP surface of the help desk: tenant resolution middleware, staff
//! knowledge API, public help center and the livechat endpoints.
//!
//! ```text
//! request ──▶ body limit ──▶ trace ──▶ CORS ──▶ security headers
//!                                                   │
//!                                                   ▼
//!                                       middleware::resolve_tenant
//!                                                   │ RequestContext
//!                                                   ▼
//!                                   routes / livechat handlers
//! ```

pub mod jobs;
pub mod livechat;
pub mod middleware;
pub mod prompt;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
