//! Application layer: the services orchestrating the store and panel ports.
//!
//! `OrderSaga` is the core workflow; `WizardSessions` feeds it validated
//! requests produced by the per-user `OrderWizard` state machine.

pub mod pricing;
pub mod promo;
pub mod saga;
pub mod session;
pub mod wallet;
pub mod wizard;
