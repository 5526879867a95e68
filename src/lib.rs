// Library exports for Filmboard
// This allows integration tests and external code to use Filmboard modules

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod routes;
pub mod service;
pub mod state;
pub mod storage;
