//! GitHub users REST API access
//!
//! A thin, unauthenticated client over the four read-only endpoints the
//! search application depends on, and the contract checks the suite runs
//! against them directly.

pub mod client;
pub mod contract;
pub mod error;

pub use client::{ApiResponse, GithubClient, GITHUB_MEDIA_TYPE};
pub use contract::{Annotation, ContractChecker, ContractReport};
pub use error::{ApiError, ApiResult};
