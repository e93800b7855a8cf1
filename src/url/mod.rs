//! URL handling module for Mycelium
//!
//! This module provides link normalization against a page location and
//! label-wise domain matching for blacklists and domain filters.

mod matcher;
mod normalize;

pub use matcher::{domain_suffixes, extract_host, matches_domain, normalize_host, DomainFilter};
pub use normalize::{normalize, normalize_link, parse_location};
