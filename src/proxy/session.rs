//! Per-transaction sessions and the descriptor-indexed session table.

use std::collections::HashMap;

use mio::net::TcpStream;
use mio::Token;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::backend::Backend;

/// Stable identifier for a session while it lives in the table.
pub type SessionId = u64;

/// Protocol phase of one proxied transaction.
///
/// Transitions are driven exclusively by the reactor's event dispatch:
///
/// ```text
/// ClientAccepted -> RequestReceived -> ConnectingUpstream
///     -> ForwardingRequest -> WaitingResponse -> SendingResponse
///     -> Completed
/// ```
///
/// `Error` is terminal and reached from any phase on a per-session failure.
/// `RequestReceived` is a label between two steps of the same dispatch
/// cycle; no event is ever dispatched on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    ClientAccepted,
    RequestReceived,
    ConnectingUpstream,
    ForwardingRequest,
    WaitingResponse,
    SendingResponse,
    Completed,
    Error,
}

/// All state for one client request being proxied to one upstream.
///
/// The session owns both sockets; dropping it closes them, and the table's
/// `remove` is the only place that happens.
#[derive(Debug)]
pub struct Session {
    pub client: TcpStream,
    pub client_token: Token,
    /// Client identity stand-in: the value of the request's Host header.
    pub client_addr: String,
    pub upstream: Option<TcpStream>,
    pub upstream_token: Option<Token>,
    pub backend: Option<Backend>,
    pub request: Option<Request>,
    pub response: Option<Response>,
    pub state: SessionState,
}

impl Session {
    pub fn new(client: TcpStream, client_token: Token) -> Self {
        Self {
            client,
            client_token,
            client_addr: String::new(),
            upstream: None,
            upstream_token: None,
            backend: None,
            request: None,
            response: None,
            state: SessionState::ClientAccepted,
        }
    }
}

/// Owner of live sessions, indexed by every registered descriptor token.
///
/// Sessions live in an arena keyed by [`SessionId`]; each of a session's one
/// or two tokens maps to that id, so an event on either descriptor resolves
/// to the same session. `remove` vacates the arena slot and unmaps both
/// tokens in one step, which is what makes a second cleanup attempt on the
/// same session a no-op.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    tokens: HashMap<Token, SessionId>,
    next_id: SessionId,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new session, indexing its client token, and returns its id.
    pub fn insert(&mut self, session: Session) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.tokens.insert(session.client_token, id);
        self.sessions.insert(id, session);
        id
    }

    /// Adds the second index entry once the upstream descriptor exists.
    pub fn bind_upstream(&mut self, id: SessionId, token: Token) {
        self.tokens.insert(token, id);
    }

    /// Resolves a descriptor token to its session id.
    pub fn id_for(&self, token: Token) -> Option<SessionId> {
        self.tokens.get(&token).copied()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Removes the session and both of its token entries. Returns `None`
    /// when the session is already gone.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.tokens.remove(&session.client_token);
        if let Some(token) = session.upstream_token {
            self.tokens.remove(&token);
        }
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
