use std::{io, time::Duration};

use mio::{Events, Interest, Poll, Registry, Token, event::Event, net::TcpListener};
use tracing::debug;

/// Thin wrapper around a `mio` event loop.
///
/// The reactor only hands out [`Token`]s and polls for readiness; it does not
/// own any connection state. Callers identify a connection by a stable
/// `Token` and look up their own bookkeeping from it — the same strategy the
/// bridge engine uses for connection slots, avoiding a cyclic owner/handle
/// relationship between socket and slot.
pub struct Reactor {
    poll: Poll,
    events: Events,
    next_token: usize,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(128), next_token: 0 })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    #[inline]
    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Binds and registers a listener for `READABLE` (accept) events.
    pub fn listen(&mut self, addr: std::net::SocketAddr) -> io::Result<(Token, TcpListener)> {
        let mut listener = TcpListener::bind(addr)?;
        let token = self.alloc_token();
        self.poll.registry().register(&mut listener, token, Interest::READABLE)?;
        debug!(%addr, ?token, "listening");
        Ok((token, listener))
    }

    /// Allocates a token for an already-connected stream and registers it.
    pub fn register_stream<S>(&mut self, source: &mut S, interest: Interest) -> io::Result<Token>
    where
        S: mio::event::Source,
    {
        let token = self.alloc_token();
        self.poll.registry().register(source, token, interest)?;
        Ok(token)
    }

    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: mio::event::Source,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: mio::event::Source,
    {
        self.poll.registry().deregister(source)
    }

    /// Polls once, non-blocking if `timeout` is `Some(Duration::ZERO)`, and
    /// invokes `handler` once per ready event.
    pub fn poll_with<F>(&mut self, timeout: Option<Duration>, mut handler: F) -> io::Result<()>
    where
        F: FnMut(&Event),
    {
        self.poll.poll(&mut self.events, timeout)?;
        for event in self.events.iter() {
            handler(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;

    #[test]
    fn listener_receives_readable_on_connect() {
        let mut reactor = Reactor::new().unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let (listen_token, listener) = reactor.listen(addr).unwrap();
        let bound = listener.local_addr().unwrap();

        let _client = std::net::TcpStream::connect(bound).unwrap();

        let mut saw_accept = false;
        for _ in 0..50 {
            reactor
                .poll_with(Some(Duration::from_millis(20)), |ev| {
                    if ev.token() == listen_token && ev.is_readable() {
                        saw_accept = true;
                    }
                })
                .unwrap();
            if saw_accept {
                break;
            }
        }
        assert!(saw_accept);
    }
}
