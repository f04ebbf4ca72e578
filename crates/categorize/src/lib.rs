pub mod categorizer;
pub mod fuzzy;
pub mod store;

pub use categorizer::{ImportReport, TransactionCategorizer};
pub use store::{
    CategoryStore, MemoryStore, MerchantMapping, SimilarityCache, StoreError, TransactionPattern,
};
