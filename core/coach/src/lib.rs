pub mod coach;
pub mod reply;

pub use coach::Coach;
pub use reply::ReplyRenderer;
