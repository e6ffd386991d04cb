use crate::http::headers::Headers;

/// A parsed HTTP/1.1 request.
///
/// `raw` holds the exact bytes the request was parsed from; the other fields
/// are the structured view. The method is kept as a plain token: the proxy
/// forwards whatever the client sent and never routes on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub raw: Vec<u8>,
}

/// Builder for constructing requests in a fluent style.
pub struct RequestBuilder {
    method: String,
    path: String,
    protocol: String,
    headers: Headers,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            protocol: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Request {
        Request {
            method: self.method,
            path: self.path,
            protocol: self.protocol,
            headers: self.headers,
            body: self.body,
            raw: Vec::new(),
        }
    }
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The Host header value, if the client sent one.
    pub fn host(&self) -> Option<&str> {
        self.header("Host")
    }

    /// Serializes the request to its wire form: request line, headers in
    /// insertion order, blank line, body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.raw.len().max(128));

        buf.extend_from_slice(
            format!("{} {} {}\r\n", self.method, self.path, self.protocol).as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);

        buf
    }
}
