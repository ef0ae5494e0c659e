pub mod api;
pub mod config;
pub mod db;
pub mod probe;
pub mod readings;
pub mod shutdown;
