pub mod category;
pub mod money;
pub mod transaction;

pub use category::{Category, CategorizationMethod};
pub use money::Money;
pub use transaction::{Categorization, RawTransaction, Transaction};
