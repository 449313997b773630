pub mod notification;
pub mod owner;
pub mod priority;
pub mod provider;
pub mod token;
