//! Centralized error type for the resona umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] resona_core::Error),

    #[error("Analysis: {0}")]
    Analysis(#[from] resona_analysis::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
