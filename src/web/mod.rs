pub mod keepalive;
pub mod liveness;
