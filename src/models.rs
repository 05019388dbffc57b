pub mod jwt;
pub mod refresh_token;
pub mod user;
