// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # mu spec
//!
//! Resolution of templated, multi-environment deployment specifications
//! (`mu.yml`).
//!
//! ## Overview
//!
//! A `mu.yml` file is a Jinja-style template that renders into one or more
//! YAML documents. This crate turns it into a fully resolved, per-environment
//! list of typed resource declarations:
//!
//! - Render the template with the `env()` and `cmd()` helpers
//! - Load every YAML document, dropping malformed ones instead of failing
//! - Optionally validate each document against a JSON schema
//! - Discover the environments, then re-render once per environment
//!
//! ## Architecture
//!
//! Resolution runs in **two passes**:
//!
//! 1. **Discovery**: render with `environment = ""` and read the
//!    `environments`, `containers` and `actions` root tags
//! 2. **Resolution**: for each environment, render again with
//!    `environment` bound to its name and collect its `resources`
//!
//! Any error in any pass aborts the whole parse.
//!
//! ## Modules
//!
//! - [`config`]: Preprocessing, loading, validation and resolution
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```yaml
//! environments:
//!   - acceptance
//!   - production:
//!       events:
//!         pre-deploy: ./migrate.sh
//! ---
//! resources:
//!   - service:
//!       name: api
//!       image: "registry/api:{{ cmd('git rev-parse --short HEAD') }}"
//!       replicas: {{ 3 if environment == "production" else 1 }}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{
    EnvironmentSpec, Parser, ParserSettings, Preprocessor, ResourceDeclaration, SchemaValidator,
    Spec, SpecHasher,
};
pub use error::{MuError, Result};
