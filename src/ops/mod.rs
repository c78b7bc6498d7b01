//! Built-in operator implementations (spec.md §4.6).

pub mod cartesian_product;
pub mod concat;
pub mod grab;
pub mod inject;
pub mod join;
pub mod keys;
pub mod param;
pub mod prune;
pub mod sort;
pub mod static_ips;
pub mod vault;
