//! HTTP response builder.
//!
//! Besides status, headers and body, a response can carry two out-of-band
//! slots used by the redirect helper:
//!
//! - a **flash** payload: output produced before a redirect, for the embedding
//!   server to keep in the session and show on the next page;
//! - a **forward** target: an [`InternalRoute`] the [`Router`](crate::router::Router)
//!   dispatches to instead of returning this response.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};
use crate::redirect::InternalRoute;

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use nixcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Found).location("/login");
///
/// let text = String::from_utf8(response.into_bytes().to_vec()).unwrap();
/// assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
/// assert!(text.contains("Location: /login\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    flash: Option<Bytes>,
    forward: Option<InternalRoute>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            flash: None,
            forward: None,
        }
    }

    /// Creates a response asking the router to dispatch `route` in its place.
    pub fn forward(route: InternalRoute) -> Self {
        Self {
            forward: Some(route),
            ..Self::new(StatusCode::Ok)
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the single `Location` header.
    #[must_use]
    pub fn location(mut self, url: impl Into<String>) -> Self {
        self.headers.set("Location", url);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Attaches output to be carried over to the next request.
    #[must_use]
    pub fn flash(mut self, output: impl Into<Bytes>) -> Self {
        self.flash = Some(output.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Returns the carried-over output, if any.
    pub fn flash_output(&self) -> Option<&Bytes> {
        self.flash.as_ref()
    }

    /// Removes and returns the carried-over output.
    pub fn take_flash(&mut self) -> Option<Bytes> {
        self.flash.take()
    }

    /// Returns the internal route this response forwards to, if any.
    pub fn forward_target(&self) -> Option<&InternalRoute> {
        self.forward.as_ref()
    }

    pub(crate) fn take_forward(&mut self) -> Option<InternalRoute> {
        self.forward.take()
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` for non-empty bodies
    /// without one, plus `Content-Length`. The flash payload
    /// is not part of the wire format.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        buf.put(self.body.as_slice());

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn location_replaces_previous() {
        let r = Response::new(StatusCode::Found)
            .location("/a")
            .location("/b");
        assert_eq!(r.headers().get_all("location").collect::<Vec<_>>(), vec!["/b"]);
    }

    #[test]
    fn redirect_wire_format() {
        let s = to_string(Response::new(StatusCode::MovedPermanently).location("/new").into_bytes());
        assert!(s.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(s.contains("Location: /new\r\n"));
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn body_gets_default_content_type() {
        let s = to_string(Response::new(StatusCode::Ok).body("Hello").into_bytes());
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn flash_is_out_of_band() {
        let mut r = Response::new(StatusCode::Found).flash("saved!");
        assert_eq!(r.flash_output().map(|b| b.as_ref()), Some(&b"saved!"[..]));
        assert_eq!(r.take_flash(), Some(Bytes::from_static(b"saved!")));
        assert!(r.flash_output().is_none());
    }

    #[test]
    fn forward_marks_response() {
        let r = Response::forward(InternalRoute::new().controller("users"));
        assert!(r.forward_target().is_some());
        assert!(Response::default().forward_target().is_none());
    }
}
