//! Contractor Billing Service - quantity reconciliation for contractor bills.

pub mod config;
pub mod models;
pub mod reconciliation;
pub mod services;
pub mod startup;
