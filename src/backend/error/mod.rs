//! Backend Error Module
//!
//! Error types specific to the backend server. Handlers return
//! [`BackendError`] and the axum conversion renders it as a JSON body.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - IntoResponse implementation
//! ```

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
