pub mod auth;
pub mod gifts;
pub mod messages;
pub mod streams;
pub mod users;
