//! Wire protocol for the PBX: line encoding of server notifications and parsing
//! of client commands. Independent of sockets and threads so it can be
//! unit-tested without standing up a server.

pub mod command;
pub mod notification;

pub use command::Command;
pub use notification::Notification;
