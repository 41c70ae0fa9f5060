pub mod backend;
pub mod server;

pub use backend::RemotePage;
pub use server::{RemoteServer, ServerEvent, ServerHandle};
