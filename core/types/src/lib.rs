pub mod types;

pub use types::Transaction;
