pub mod admin;
pub mod auth;
pub mod backend;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod export;
pub mod listing;
pub mod model;
pub mod notify;
pub mod submission;

pub use error::{Result, StoreError};
