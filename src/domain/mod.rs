// Domain layer: transport-level records and the ports the client depends on.

pub mod model;
pub mod ports;
