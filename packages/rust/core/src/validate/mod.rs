//! Document validators: format conformance and quality scoring.

pub mod quality;
pub mod spec;

pub use quality::validate_quality;
pub use spec::{CONTEXT_FORK, MAX_BODY_LINES, as_bool, derive_name_from_url, validate_spec};
