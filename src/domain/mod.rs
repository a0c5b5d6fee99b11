//! Domain model: transaction records, verification tasks and the ports the
//! engine needs from the outside world.

pub mod anomaly;
pub mod fingerprint;
pub mod ports;
pub mod record;
pub mod task;
pub mod transaction;
