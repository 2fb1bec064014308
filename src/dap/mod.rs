//! Client side of the Debug Adapter Protocol: wire envelopes, transports
//! and the request/response channel the view core talks through.

pub mod client;
pub mod protocol;
pub mod transport;
