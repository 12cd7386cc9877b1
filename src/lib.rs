//! A movie catalogue behind one repository contract with in-memory and
//! SQLite backends.

pub mod config;
pub mod database;
pub mod db;
pub mod entities;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod repository;
pub mod services;
