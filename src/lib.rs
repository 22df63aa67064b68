pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod i18n;
pub mod orm;
