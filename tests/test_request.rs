use ginx::http::headers::Headers;
use ginx::http::request::RequestBuilder;

#[test]
fn test_headers_insertion_order_iteration() {
    let mut headers = Headers::new();
    headers.set("Host", "example.com");
    headers.set("User-Agent", "test");
    headers.set("Accept", "*/*");

    let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Host", "User-Agent", "Accept"]);
}

#[test]
fn test_headers_last_write_wins_keeps_position() {
    let mut headers = Headers::new();
    headers.set("Host", "first");
    headers.set("Accept", "*/*");
    headers.set("Host", "second");

    assert_eq!(headers.len(), 2);
    assert_eq!(headers.get("Host").unwrap(), "second");

    let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Host", "Accept"]);
}

#[test]
fn test_headers_names_are_case_sensitive() {
    let mut headers = Headers::new();
    headers.set("Host", "upper");
    headers.set("host", "lower");

    assert_eq!(headers.len(), 2);
    assert_eq!(headers.get("Host").unwrap(), "upper");
    assert_eq!(headers.get("host").unwrap(), "lower");
    assert!(headers.get("HOST").is_none());
}

#[test]
fn test_request_builder_defaults() {
    let request = RequestBuilder::new("GET", "/").build();

    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/");
    assert_eq!(request.protocol, "HTTP/1.1");
    assert!(request.headers.is_empty());
    assert!(request.body.is_empty());
}

#[test]
fn test_request_host_accessor() {
    let request = RequestBuilder::new("GET", "/")
        .header("Host", "proxy.example")
        .build();

    assert_eq!(request.host().unwrap(), "proxy.example");
    assert!(RequestBuilder::new("GET", "/").build().host().is_none());
}

#[test]
fn test_request_serialize_wire_format() {
    let request = RequestBuilder::new("POST", "/api/users")
        .header("Host", "10.0.0.1:8080")
        .header("Content-Length", "4")
        .body(b"data".to_vec())
        .build();

    let expected = b"POST /api/users HTTP/1.1\r\n\
                     Host: 10.0.0.1:8080\r\n\
                     Content-Length: 4\r\n\
                     \r\n\
                     data";
    assert_eq!(request.serialize(), expected.to_vec());
}

#[test]
fn test_request_serialize_without_headers_or_body() {
    let request = RequestBuilder::new("GET", "/x").build();
    assert_eq!(request.serialize(), b"GET /x HTTP/1.1\r\n\r\n".to_vec());
}
