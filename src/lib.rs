//! Local Public Key Directory for ePassport trust material: ingestion and
//! parsing of CSCA/DSC/Master List/CRL/Link Certificate artifacts, a
//! two-store model (relational database + LDAP directory) kept in sync by
//! a reconciler, and a Passive Authentication verifier.

pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod pa;
pub mod parser;
pub mod pki;
pub mod pool;
pub mod query;
pub mod reconciler;
pub mod repositories;
pub mod scheduler;
pub mod service;
pub mod trust_chain;

pub use error::{PkdError, PkdResult};
