pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod drive;
pub mod error;
pub mod mailer;
pub mod models;
pub mod repo;
pub mod routes;
pub mod schema;
pub mod sequence;
pub mod sharelink;
pub mod state;
pub mod sync;
