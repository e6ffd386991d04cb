use crate::http::headers::Headers;

/// A parsed HTTP/1.1 response.
///
/// The reason phrase is not retained from the wire; serialization derives it
/// from the status code again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub raw: Vec<u8>,
}

/// Returns the reason phrase serialized for a status code.
///
/// Codes outside the table get a placeholder phrase rather than failing:
/// the proxy relays status codes it does not recognize.
pub fn reason_phrase(status_code: u16) -> String {
    match status_code {
        200 => "OK".to_string(),
        404 => "Not Found".to_string(),
        405 => "Method Not Allowed".to_string(),
        500 => "Internal Server Error".to_string(),
        other => format!("Unknown status code: {other}"),
    }
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Serializes the response to its wire form: status line, headers in
    /// insertion order, blank line, body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.raw.len().max(128));

        buf.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status_code,
                reason_phrase(self.status_code)
            )
            .as_bytes(),
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
