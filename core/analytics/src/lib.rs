pub mod health;
pub mod signals;
pub mod store;
pub mod timeline;

pub use health::{health_score, health_score_now};
pub use signals::derive_signals;
pub use store::ReadStore;
pub use timeline::{classify_theme, monthly_buckets};
