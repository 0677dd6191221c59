//! HTTP handlers, grouped by domain
//!
//! `state` holds the shared `MentionService`; `router` wires the routes and
//! splits them into public, protected and admin groups.

pub mod backfill;
pub mod events;
pub mod health;
pub mod profile;
pub mod router;
pub mod state;
pub mod types;
pub mod users;

pub use router::{
    build_admin_routes, build_protected_routes, build_public_routes, build_router, AppState,
};
pub use state::MentionService;
