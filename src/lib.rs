//! Newsdesk - a newsroom content service
//!
//! Journalists submit articles, editors approve or reject them, and readers
//! subscribed to the author or the publisher are notified on approval.

pub mod api;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod services;
