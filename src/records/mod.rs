//! Flat record sets, parent-linked trees, filtering and search.

mod filter;
mod index;
mod tree;

pub use filter::{filter_records, filter_tree, record_matches};
pub use index::SearchIndex;
pub use tree::{
    CHILDREN_KEY, FlatRow, TreeOptions, TreeRow, flat_rows, flatten, nest, visible_rows,
};
