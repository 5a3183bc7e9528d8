pub mod application;
pub mod cache;
pub mod components;
pub mod config;
pub mod domain;
pub mod infra;
