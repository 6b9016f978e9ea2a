pub mod auth;
pub mod config;
pub mod db;
pub mod function;
pub mod logger;
pub mod menu;
pub mod notice;
pub mod rotator;
pub mod ui;
