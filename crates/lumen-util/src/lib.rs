pub mod snowflake;
pub mod tokens;
