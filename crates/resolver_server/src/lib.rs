//! view_resolver process pieces: configuration, the HTTP bus publisher, the
//! bus observer loop and the REST surface. `main.rs` wires them together.

pub mod bus;
pub mod config;
pub mod error;
pub mod handlers;
pub mod observer;
pub mod router;
pub mod supervisor;
