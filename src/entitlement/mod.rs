//! Entitlement resolution
//!
//! Computes which modules an actor may reach. One resolver handles every
//! role; the precedence rules (grant, expiry, per-user restriction, category
//! override) live in [`compute_entitlements`] so they can be tested without a
//! database.

pub mod cache;
pub mod resolver;

pub use cache::EntitlementCache;
pub use resolver::{compute_entitlements, resolve_category, EntitlementResolver};
