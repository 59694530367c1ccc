//! Property-rental management core.
//!
//! The crate models a small rental business: rooms, tenants, rental
//! agreements, monthly utility billing, maintenance records, income
//! statistics, and user accounts. Every handler talks to a schemaless
//! [`store::Store`], so the crate also carries a consistency engine that
//! detects and repairs drift between a room's cached rental pointer and
//! the rental records themselves.

pub mod billing;
pub mod config;
pub mod consistency;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod maintenance;
pub mod rentals;
pub mod rooms;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod tenants;
pub mod users;
