//! `depscope`: turn a package manifest into a dependency-analysis request body.
//!
//! # Flow
//! 1. Pick the ecosystem from the manifest file name ([`detector::ecosystem_for`]).
//! 2. Build the matching [`provider::Provider`] with a [`config::Config`] ([`provider::create`]).
//! 3. Optionally check the lock file ([`provider::Provider::validate_lock_file`]).
//! 4. Produce a stack or component [`models::Content`], a CycloneDX SBOM ([`sbom`]).

pub mod config;
pub mod detector;
pub mod error;
pub mod graph;
pub mod models;
pub mod provider;
pub mod sbom;

pub use config::{load_config, Config};
pub use error::ProviderError;
pub use models::{Content, Ecosystem, MATCH_MANIFEST_VERSIONS};
pub use provider::{create, Provider};
