//! Wikitext and search-result heuristics: template scanning, twin template
//! shapes, and picking the canonical page title.

pub mod titles;
pub mod twins;
pub mod wikitext;
