//! HTTP requests as seen by route handlers.

use super::{Headers, Method};

/// An HTTP request handed to the [`Router`](crate::router::Router).
///
/// Only the path takes part in routing; a query string in the target is
/// dropped on construction.
///
/// # Examples
///
/// ```
/// use nixcache::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/users/edit/3?tab=profile")
///     .header("Host", "localhost");
///
/// assert_eq!(request.path(), "/users/edit/3");
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
}

impl Request {
    /// Creates a request for `target` (path plus optional `?query`).
    pub fn new(method: Method, target: impl AsRef<str>) -> Self {
        let target = target.as_ref();
        let path = target.split_once('?').map_or(target, |(path, _)| path);
        let path = if path.is_empty() { "/" } else { path };

        Self {
            method,
            path: path.to_owned(),
            headers: Headers::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(target: impl AsRef<str>) -> Self {
        Self::new(Method::Get, target)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_not_part_of_path() {
        assert_eq!(Request::get("/search?q=rust+cache&page=2").path(), "/search");
    }

    #[test]
    fn empty_target_is_root() {
        assert_eq!(Request::get("").path(), "/");
        assert_eq!(Request::get("?x=1").path(), "/");
    }

    #[test]
    fn method_and_headers() {
        let req = Request::new(Method::Post, "/save").header("Content-Type", "application/json");
        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.headers().get("content-type"), Some("application/json"));
    }
}
