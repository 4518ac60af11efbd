pub mod gateway;
pub mod id;
pub mod message;
pub mod stream;
pub mod user;
