//! The `architectd` HTTP surface as a library: kept separate from
//! `main.rs` so the router can be driven directly in integration tests
//! without a bound socket.
pub mod error;
pub mod routes;
