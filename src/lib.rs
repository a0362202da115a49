//! Order fulfillment engine for VPN resellers: wallet ledger, promo codes,
//! tariff-based pricing, an order wizard state machine, and the saga that
//! turns confirmed orders into provisioned panel clients.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
