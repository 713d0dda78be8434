//! Authentication Module
//!
//! Bearer token validation for the workspace routes. Users and token
//! issuance live in the account service; this server trusts any token
//! signed with the shared `JWT_SECRET`.

/// JWT token validation
pub mod sessions;

pub use sessions::{create_token, verify_token, AuthSettings, Claims};
