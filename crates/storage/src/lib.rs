pub mod category_store;
pub mod db;

pub use category_store::SqliteCategoryStore;
pub use db::{create_db, get_transactions, insert_transactions, DbPool};
