pub mod agent;
pub mod money;
pub mod order;
pub mod ports;
pub mod promo;
pub mod tariff;
