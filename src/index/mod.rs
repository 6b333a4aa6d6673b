pub mod b_plus_tree;
pub mod index_iterator;
pub mod index_key;
pub mod index_roots_page;
pub mod tree_page;

pub use b_plus_tree::BPlusTree;
pub use index_iterator::IndexIterator;
pub use index_key::IndexKey;
pub use index_roots_page::IndexRootsPage;
