mod inline_query_received;
mod link_received;

pub use inline_query_received::inline_query_received;
pub use link_received::link_received;
