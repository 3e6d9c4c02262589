pub mod config;
pub mod db;
pub mod notification;
pub mod notification_store;
