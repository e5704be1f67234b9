pub mod api;
pub mod balance;
pub mod cli;
pub mod collector;
pub mod config;
pub mod cost;
pub mod db;
pub mod fanout;
pub mod status;
