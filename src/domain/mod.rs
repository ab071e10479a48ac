//! Domain layer: records, their state machines, notifications and the ports
//! through which the application layer reaches storage and subscribers.

pub mod customer;
pub mod events;
pub mod payment;
pub mod ports;
pub mod queue;
