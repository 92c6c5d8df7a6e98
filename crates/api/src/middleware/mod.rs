//! Request extractors that gate handlers.
//!
//! - [`auth`] -- authenticated end users (Bearer access token).
//! - [`cron`] -- scheduled callers holding the cron secret.
//! - [`throttle`] -- authenticated users, at most once per interval per route.

pub mod auth;
pub mod cron;
pub mod throttle;
