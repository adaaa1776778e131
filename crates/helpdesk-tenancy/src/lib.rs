//! # Helpdesk Tenancy
//!
//! Tenant Context Resolver for the multi-tenant help desk.
//!
//! ## Design
//! - **One SQLite file per tenant**: isolation by construction, no shared tables
//! - **Store cache**: each tenant store is opened once per process and shared
//! - **Serialized writes**: every store guards its connection with a mutex
//! - **Request context**: `{tenant, store}` snapshot threaded explicitly through
//!   handlers, optionally mirrored into a task-local for ambient access
//!
//! ## How it works
//! ```text
//! request ──▶ PathClass::classify(path)
//!               │
//!               ▼
//!          TenantResolver::resolve(session, query)
//!               │  PlatformDb: tenant exists? active? trial?
//!               ▼
//!          StoreRegistry::get_or_open(tenant_id)  (cached)
//!               │
//!               ▼
//!          RequestContext ──▶ context::scope(ctx, handler)
//! ```

pub mod auth;
pub mod context;
pub mod db;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod store;

pub use context::RequestContext;
pub use db::{PlatformDb, Tenant, User};
pub use registry::StoreRegistry;
pub use resolver::{PathClass, Resolution, TenantResolver, TenantSource};
pub use session::{Session, SessionStore};
pub use store::TenantStore;
