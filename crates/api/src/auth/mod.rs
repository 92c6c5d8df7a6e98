//! Authentication primitives.
//!
//! Accounts and sign-in live with the external auth provider. This server
//! only verifies the access tokens it issues:
//!
//! - [`jwt`] -- HS256 access-token validation.

pub mod jwt;
