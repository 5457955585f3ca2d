//! Bucket client, its configuration and per-call context.

mod call_context;
mod object_listing;
mod store_client;
mod store_config;

pub use call_context::CallContext;
pub use object_listing::ObjectListing;
pub use store_client::Client;
pub use store_config::StoreConfig;
