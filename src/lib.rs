pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod password;
pub mod principal;
pub mod routes;
pub mod services;
pub mod state;
