//! Tests for the session table's two-tokens-one-session indexing.

use std::net::TcpListener;

use mio::Token;

use ginx::proxy::session::{Session, SessionState, SessionTable};

/// A connected non-blocking stream for building sessions; real sockets keep
/// the table's ownership semantics honest (dropping a session closes them).
fn connected_stream() -> mio::net::TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = std::net::TcpStream::connect(addr).unwrap();
    let _accepted = listener.accept().unwrap();
    client.set_nonblocking(true).unwrap();
    mio::net::TcpStream::from_std(client)
}

#[test]
fn test_new_session_starts_in_client_accepted() {
    let session = Session::new(connected_stream(), Token(7));
    assert_eq!(session.state, SessionState::ClientAccepted);
    assert_eq!(session.client_token, Token(7));
    assert!(session.upstream.is_none());
    assert!(session.upstream_token.is_none());
    assert!(session.request.is_none());
}

#[test]
fn test_insert_indexes_client_token() {
    let mut table = SessionTable::new();
    let id = table.insert(Session::new(connected_stream(), Token(1)));

    assert_eq!(table.id_for(Token(1)), Some(id));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_both_tokens_resolve_to_same_session() {
    let mut table = SessionTable::new();
    let id = table.insert(Session::new(connected_stream(), Token(1)));

    let session = table.get_mut(id).unwrap();
    session.upstream = Some(connected_stream());
    session.upstream_token = Some(Token(2));
    table.bind_upstream(id, Token(2));

    assert_eq!(table.id_for(Token(1)), Some(id));
    assert_eq!(table.id_for(Token(2)), Some(id));
}

#[test]
fn test_remove_unmaps_both_tokens() {
    let mut table = SessionTable::new();
    let id = table.insert(Session::new(connected_stream(), Token(1)));

    let session = table.get_mut(id).unwrap();
    session.upstream = Some(connected_stream());
    session.upstream_token = Some(Token(2));
    table.bind_upstream(id, Token(2));

    assert!(table.remove(id).is_some());
    assert_eq!(table.id_for(Token(1)), None);
    assert_eq!(table.id_for(Token(2)), None);
    assert!(table.is_empty());
}

#[test]
fn test_second_remove_returns_none() {
    let mut table = SessionTable::new();
    let id = table.insert(Session::new(connected_stream(), Token(1)));

    assert!(table.remove(id).is_some());
    assert!(table.remove(id).is_none());
}

#[test]
fn test_sessions_get_distinct_ids() {
    let mut table = SessionTable::new();
    let first = table.insert(Session::new(connected_stream(), Token(1)));
    let second = table.insert(Session::new(connected_stream(), Token(2)));

    assert_ne!(first, second);
    assert_eq!(table.len(), 2);
    assert_eq!(table.id_for(Token(1)), Some(first));
    assert_eq!(table.id_for(Token(2)), Some(second));
}
