//! The b402 facilitator HTTP service.
//!
//! Wires the scheme handlers, cross-chain router, and bridge worker behind
//! the facilitator HTTP surface: `/verify`, `/settle`, `/supported`,
//! `/health`, plus the bridge admin endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod router;
