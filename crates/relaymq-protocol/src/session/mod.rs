pub mod store_key;
pub mod topic_alias;

pub use store_key::StoreKey;
pub use topic_alias::InboundTopicAliases;
