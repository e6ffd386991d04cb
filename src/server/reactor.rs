//! The event loop and the per-session handlers.
//!
//! One thread blocks in the multiplexer and dispatches each readiness event
//! to the session it targets. A session advances through its phases in
//! response to exactly the `(state, event)` pairs below; anything else is
//! ignored without a state change:
//!
//! | State              | Event    | Action                                  |
//! |--------------------|----------|-----------------------------------------|
//! | `ClientAccepted`   | readable | read + parse request, start connect     |
//! | `ConnectingUpstream` | writable | finish connect, forward the request   |
//! | `ForwardingRequest` | readable | relay the response, then cleanup       |
//!
//! Error and hangup notifications short-circuit to cleanup from any phase.
//! Cleanup is idempotent: the session table vacates the session's slot once,
//! and later events on its descriptors resolve to nothing.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use mio::net::TcpStream;
use mio::{Interest, Token};

use crate::config::Config;
use crate::http::parser;
use crate::net::poller::{Poller, ReadyEvent};
use crate::net::sock;
use crate::proxy::backend::BackendPool;
use crate::proxy::session::{Session, SessionId, SessionState, SessionTable};

/// Token reserved for the listen socket.
const LISTENER: Token = Token(0);

/// Per-event read buffer for requests and responses. One transaction must
/// fit a single read on each side; larger payloads are out of scope.
const READ_BUF_SIZE: usize = 4096;

/// The reverse-proxy reactor: listen socket, multiplexer, session table,
/// and upstream pool, all owned by one thread.
pub struct Server {
    listener: Option<mio::net::TcpListener>,
    poller: Poller,
    sessions: SessionTable,
    pool: BackendPool,
    ready: Vec<ReadyEvent>,
    next_token: usize,
}

impl Server {
    /// Binds the listen socket and registers it with the multiplexer.
    ///
    /// # Errors
    ///
    /// Listen-socket or multiplexer creation failures are process-fatal;
    /// startup aborts on them.
    pub fn bind(config: &Config, pool: BackendPool) -> Result<Self> {
        let mut listener = sock::bind_listener(&config.server.address, config.server.port)
            .with_context(|| {
                format!(
                    "failed to bind listen socket on {}:{}",
                    config.server.address, config.server.port
                )
            })?;

        let poller = Poller::new().context("failed to create readiness multiplexer")?;
        poller
            .add(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listen socket")?;

        tracing::info!(
            address = %config.server.address,
            port = config.server.port,
            "Server started and listening"
        );

        Ok(Self {
            listener: Some(listener),
            poller,
            sessions: SessionTable::new(),
            pool,
            ready: Vec::new(),
            next_token: LISTENER.0 + 1,
        })
    }

    /// The bound listen address, while the listener is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Runs the event loop until a process-fatal error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.poll_once(None)
                .context("failed to wait for readiness events")?;
        }
    }

    /// Processes one readiness cycle: waits (up to `timeout` when given) and
    /// dispatches every delivered event in order. Returns the number of
    /// events handled.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut ready = std::mem::take(&mut self.ready);
        let count = self.poller.wait(&mut ready, timeout)?;
        for index in 0..count {
            self.handle_event(ready[index]);
        }
        self.ready = ready;
        Ok(count)
    }

    /// Deregisters and closes the listen socket. In-flight sessions are not
    /// drained.
    pub fn stop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            if let Err(error) = self.poller.remove(&mut listener) {
                tracing::error!(error = %error, "Failed to deregister listen socket");
            }
        }
    }

    fn handle_event(&mut self, event: ReadyEvent) {
        if event.token == LISTENER {
            if event.readable {
                self.accept_ready();
            }
            return;
        }

        let Some(id) = self.sessions.id_for(event.token) else {
            // Stale readiness for a descriptor cleaned up earlier in this
            // batch, or never registered. Not an error.
            tracing::debug!(token = event.token.0, "Event on unknown descriptor ignored");
            return;
        };

        if event.error {
            tracing::error!(token = event.token.0, session = id, "Socket error event");
            self.diagnose(id, event.token);
            self.cleanup(id);
            return;
        }

        if event.hangup {
            tracing::debug!(token = event.token.0, session = id, "Connection hangup event");
            self.diagnose(id, event.token);
            self.cleanup(id);
            return;
        }

        let Some((state, upstream_token)) = self
            .sessions
            .get(id)
            .map(|session| (session.state, session.upstream_token))
        else {
            return;
        };

        match state {
            SessionState::ClientAccepted if event.readable => match self.client_request(id) {
                Ok(true) => {
                    if let Err(error) = self.connect_upstream(id) {
                        tracing::error!(session = id, error = %error, "Failed to connect upstream");
                        self.fail(id);
                    }
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::error!(session = id, error = %error, "Failed to handle client request");
                    self.fail(id);
                }
            },
            SessionState::ConnectingUpstream if event.writable => {
                if let Err(error) = self.forward_request(id) {
                    tracing::error!(session = id, error = %error, "Failed to forward request upstream");
                    self.fail(id);
                }
            }
            SessionState::ForwardingRequest
                if event.readable && Some(event.token) == upstream_token =>
            {
                if let Err(error) = self.upstream_response(id) {
                    tracing::error!(session = id, error = %error, "Failed to relay upstream response");
                }
                self.cleanup(id);
            }
            _ => {
                // No transition for this state/event combination.
                tracing::trace!(session = id, state = ?state, "Ignored event");
            }
        }
    }

    /// Drains the listen socket, one new session per accepted connection.
    ///
    /// The listener is edge-triggered, so accepting must loop until the
    /// would-block sentinel.
    fn accept_ready(&mut self) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };

            match accepted {
                Ok((mut client, peer)) => {
                    let token = self.alloc_token();
                    if let Err(error) = self.poller.add(&mut client, token, Interest::READABLE) {
                        tracing::error!(error = %error, "Failed to register accepted connection");
                        continue; // dropping the stream closes it
                    }
                    let id = self.sessions.insert(Session::new(client, token));
                    tracing::info!(session = id, token = token.0, peer = %peer, "New connection accepted");
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    return;
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to accept connection");
                    return;
                }
            }
        }
    }

    /// Reads and parses the client's request.
    ///
    /// Returns `Ok(true)` when the session should proceed to the upstream
    /// connect in this same dispatch cycle, `Ok(false)` when the read was
    /// interrupted and the session stays as it was.
    fn client_request(&mut self, id: SessionId) -> Result<bool> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow!("session {id} not found"))?;

        let mut buf = [0u8; READ_BUF_SIZE];
        let n = match session.client.read(&mut buf) {
            Ok(0) => bail!("client closed the connection before sending a request"),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(err) => return Err(err).context("failed to read from client"),
        };

        let request = parser::parse_request(&buf[..n]).context("failed to parse HTTP request")?;
        session.client_addr = request.host().unwrap_or_default().to_string();

        tracing::info!(
            session = id,
            method = %request.method,
            path = %request.path,
            host = %session.client_addr,
            "HTTP request received"
        );

        session.request = Some(request);
        session.state = SessionState::RequestReceived;
        Ok(true)
    }

    /// Selects an upstream, rewrites the request's Host header, and starts
    /// the non-blocking connect. The upstream descriptor becomes the second
    /// table index entry for the same session.
    fn connect_upstream(&mut self, id: SessionId) -> Result<()> {
        let backend = self
            .pool
            .select()
            .context("failed to select upstream server")?;
        let token = self.alloc_token();

        {
            let session = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| anyhow!("session {id} not found"))?;
            let request = session
                .request
                .as_mut()
                .ok_or_else(|| anyhow!("session {id} has no parsed request"))?;
            // The forwarded bytes must carry the upstream's authority as
            // Host; serialization picks this up when the request is written.
            request.headers.set("Host", backend.authority());
        }

        tracing::debug!(session = id, upstream = %backend.authority(), "Connecting to upstream");

        let mut upstream = sock::connect_upstream(backend.addr())
            .context("failed to connect to upstream server")?;
        self.poller
            .add(&mut upstream, token, Interest::WRITABLE)
            .context("failed to register upstream connection")?;

        self.sessions.bind_upstream(id, token);
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow!("session {id} not found"))?;
        session.upstream = Some(upstream);
        session.upstream_token = Some(token);
        session.backend = Some(backend);
        session.state = SessionState::ConnectingUpstream;
        Ok(())
    }

    /// Completes the non-blocking connect and writes the request upstream.
    ///
    /// The first writability event may be reporting an asynchronous connect
    /// failure, so SO_ERROR is consulted before anything is written.
    fn forward_request(&mut self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow!("session {id} not found"))?;
        let upstream = session
            .upstream
            .as_mut()
            .ok_or_else(|| anyhow!("session {id} has no upstream socket"))?;

        match upstream.take_error() {
            Ok(None) => {}
            Ok(Some(error)) => bail!("upstream connect failed: {error}"),
            Err(error) => bail!("failed to query upstream socket state: {error}"),
        }

        let request = session
            .request
            .as_ref()
            .ok_or_else(|| anyhow!("session {id} has no parsed request"))?;
        let bytes = request.serialize();
        write_full(upstream, &bytes).context("failed to write request to upstream")?;

        let token = session
            .upstream_token
            .ok_or_else(|| anyhow!("session {id} has no upstream token"))?;
        self.poller
            .modify(upstream, token, Interest::READABLE)
            .context("failed to rearm upstream for reading")?;

        session.state = SessionState::ForwardingRequest;
        tracing::debug!(session = id, "Request forwarded to upstream");
        Ok(())
    }

    /// Reads the upstream's response, stamps the proxy headers, and relays
    /// it to the client. The dispatcher cleans the session up afterwards
    /// whether this succeeds or not.
    fn upstream_response(&mut self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| anyhow!("session {id} not found"))?;
        let upstream = session
            .upstream
            .as_mut()
            .ok_or_else(|| anyhow!("session {id} has no upstream socket"))?;

        let mut buf = [0u8; READ_BUF_SIZE];
        let n = match upstream.read(&mut buf) {
            Ok(0) => bail!("upstream closed the connection before responding"),
            Ok(n) => n,
            Err(err) => return Err(err).context("failed to read from upstream"),
        };

        let mut response =
            parser::parse_response(&buf[..n]).context("failed to parse HTTP response")?;
        session.state = SessionState::WaitingResponse;

        // Hop-identifying headers, overwriting whatever the upstream sent.
        response.headers.set("Server", "ginx");
        response
            .headers
            .set("X-Forwarded-For", session.client_addr.clone());
        response.headers.set("X-Forwarded-Proto", "http");
        response.headers.set("Via", "ginx/1.0");
        response.headers.set("Connection", "close");
        response
            .headers
            .set("Content-Length", response.body.len().to_string());

        let bytes = response.serialize();
        let status_code = response.status_code;
        let content_length = response.body.len();
        session.response = Some(response);

        session.state = SessionState::SendingResponse;
        write_full(&mut session.client, &bytes).context("failed to write response to client")?;
        session.state = SessionState::Completed;

        tracing::info!(
            session = id,
            status = status_code,
            content_length,
            "Request completed"
        );
        Ok(())
    }

    /// SO_ERROR diagnostic for the descriptor an error/hangup event named.
    fn diagnose(&mut self, id: SessionId, token: Token) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        if session.client_token == token {
            sock::check_state(&session.client);
        } else if let Some(upstream) = session.upstream.as_ref() {
            sock::check_state(upstream);
        }
    }

    /// Marks the session failed and tears it down.
    fn fail(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.state = SessionState::Error;
        }
        self.cleanup(id);
    }

    /// Tears a session down: removes it from the table, deregisters both
    /// descriptors, and closes them. A second call for the same session
    /// finds nothing and returns; deregistering a descriptor the OS already
    /// forgot is logged and tolerated.
    fn cleanup(&mut self, id: SessionId) {
        let Some(mut session) = self.sessions.remove(id) else {
            return;
        };

        if let Err(error) = self.poller.remove(&mut session.client) {
            tracing::debug!(session = id, error = %error, "Failed to deregister client socket");
        }
        if let Some(mut upstream) = session.upstream.take() {
            if let Err(error) = self.poller.remove(&mut upstream) {
                tracing::debug!(session = id, error = %error, "Failed to deregister upstream socket");
            }
        }

        tracing::info!(
            session = id,
            client_token = session.client_token.0,
            upstream_token = ?session.upstream_token,
            "Session terminated"
        );
        // Dropping the session closes both sockets.
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }
}

/// Writes the whole buffer, retrying short writes and interruptions within
/// the call. Payloads are assumed to fit the kernel send buffer, so a
/// would-block mid-write fails the session instead of buffering across
/// events.
fn write_full(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
