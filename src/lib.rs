pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod sql;
