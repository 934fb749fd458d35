//! MySQL/MariaDB wire protocol front-end for the gateway (C2-C5):
//! packet framing and handshake, session state, SQL translation, and
//! command dispatch against `gateway_core`.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{ProtoError, Result};
pub use server::{run, ServerConfig};
pub use session::Session;
