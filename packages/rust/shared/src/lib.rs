//! Shared types, error model, and configuration for riskclause.
//!
//! This crate is the foundation depended on by all other riskclause crates.
//! It provides:
//! - [`RiskClauseError`], the unified error type
//! - Domain types ([`RiskTerm`], [`CanonicalTermSet`], [`PageText`],
//!   [`AccumulatedResult`], [`FinalReport`], [`RunManifest`])
//! - Configuration ([`AppConfig`], [`ClassifierConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, DefaultsConfig, ProviderConfig, RetryConfig, RetryPolicy,
    api_key, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key, validate_config,
};
pub use error::{Result, RiskClauseError};
pub use types::{
    AccumulatedResult, Band, BandPartitions, CURRENT_SCHEMA_VERSION, CanonicalTermSet,
    FinalReport, PageClassification, PageText, RiskTerm, RunId, RunManifest,
};
