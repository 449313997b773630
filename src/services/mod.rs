pub mod dispatch;
pub mod push_token_service;
pub mod token_store;
