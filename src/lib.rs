//! `redmine2gitlab` - Redmine to GitLab issue migration
//!
//! This crate provides the engine behind the `rm2gl` CLI. It copies a Redmine
//! project's issues into a GitLab project in three passes: create every issue,
//! replay each issue's history, then link relations.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Layered YAML configuration
//! - [`error`] - Error types and handling
//! - [`format`] - Markdown rendering for notes and descriptions
//! - [`migrate`] - The migration engine and its reports
//! - [`model`] - Redmine and GitLab data types
//! - [`source`] - Redmine access (REST client and in-memory double)
//! - [`target`] - GitLab access (REST client and in-memory double)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
mod http;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod source;
pub mod target;

pub use error::{ErrorCode, MigrateError, Result, StructuredError};
