// Library for the binary, tests and demos

pub mod cli;
pub mod config;
pub mod db;
pub mod manifest;
pub mod migration;
pub mod models;
pub mod routes;
pub mod stats_repo;
pub mod sync;
pub mod sync_worker;
pub mod version;
