pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod invoice_gen;
pub mod invoicing;
pub mod mail;
pub mod models;
pub mod onboarding;
pub mod permissions;
pub mod signing;
pub mod ui;
pub mod validation;
