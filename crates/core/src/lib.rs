//! Domain logic for the Rally study tracker.
//!
//! This crate performs no I/O of its own. Persistence is reached through the
//! [`store::StudyStore`] trait so the reconciler can run against Postgres in
//! production and an in-memory fake in tests.

pub mod day_boundary;
pub mod error;
pub mod reconcile;
pub mod store;
pub mod types;
