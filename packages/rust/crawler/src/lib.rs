//! Outbound HTTP and repository scanning.
//!
//! This crate provides:
//! - [`Fetcher`] — shared HTTP GET wrapper with timeout, redirect limit and body cap
//! - [`GithubClient`] — repository metadata, recursive trees and search
//! - [`RepoScanner`] — repository intent classification and skill candidate listing

pub mod fetcher;
pub mod github;
pub mod scanner;

pub use fetcher::{FetchResponse, Fetcher, MAX_BODY_BYTES, USER_AGENT};
pub use github::{GithubClient, GithubError, RepoInfo, TreeEntry};
pub use scanner::{
    RepoScanner, ScanOutcome, ScanRules, SkillCandidate, classify, glob_to_regex,
    intent_score, is_canonical_path, tier_for,
};
