//! Service assembly for an OAuth 2.0 / OpenID Connect authorization server.
//!
//! [`composition::assemble`] runs the registration phases once at startup and
//! yields an [`composition::IdentityServer`]: a frozen service provider plus the
//! protocol route table. [`host::router`] serves it over axum.

pub mod composition;
pub mod config;
pub mod container;
pub mod endpoints;
mod error;
pub mod host;
pub mod protocol;
pub mod response;
pub mod services;
pub mod stores;
pub mod validation;

pub use composition::{
    assemble, assemble_from_file, assemble_with, IdentityServer, IdentityServerBuilder,
};
pub use error::{TollgateError, TollgateResult};
