mod reactor;

pub use mio::{Interest, Registry, Token, event::Event, net::TcpListener, net::TcpStream};
pub use reactor::Reactor;
