pub mod aggregate;
pub mod db;
pub mod error;
pub mod models;
pub mod prompts;
pub mod service;
pub mod vision;
