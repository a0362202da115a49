//! 3x-ui panel integration: the HTTP provisioner adapter and the link
//! construction helpers shared with the order saga.

pub mod client;
pub mod link;
