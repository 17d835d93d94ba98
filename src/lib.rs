pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod kafka;
pub mod models;
pub mod processor;
