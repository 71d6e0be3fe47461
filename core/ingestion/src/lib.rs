pub mod database;
pub mod identity;
pub mod importer;
pub mod sentiment;

pub use database::{Database, StoreStats};
pub use identity::{UserContext, USER_HEADER};
pub use importer::{import_csv, is_valid_timestamp, parse_csv, ImportError, ImportStats};
pub use sentiment::SentimentClient;
