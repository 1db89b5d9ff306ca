pub mod protocol;
pub mod packet;
pub mod auth;
pub mod handshake;
pub mod session;
pub mod server;
pub mod connection;

pub use server::MysqlServer;
pub use connection::MysqlConnection;
pub use handshake::{Handshake, HandshakeReply, HandshakeState};
pub use session::{Session, SessionAction};
pub use auth::{scramble_password, verify_native_password};
pub use protocol::*;
pub use packet::*;
