//! Domain layer: value objects, the transaction lifecycle, and the ports the
//! application layer talks to.

pub mod gateway;
pub mod money;
pub mod ports;
pub mod reconciliation;
pub mod transaction;
pub mod wallet;
