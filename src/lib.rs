pub mod api;
pub mod data_collector;
pub mod database;
pub mod models;
pub mod scheduler;
pub mod symbols;
pub mod utils;
