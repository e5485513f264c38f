//! Link creation, short code allocation and routing rule evaluation.

pub mod rules;
pub mod service;
pub mod shortcode;

pub use rules::evaluate;
pub use shortcode::{allocate, ShortCodeError, UniquenessChecker};
