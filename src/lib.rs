pub mod agent;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod relay;
pub mod routes;
pub mod service;
