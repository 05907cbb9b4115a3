//! Per-request context handed to route handlers.
//!
//! Besides the [`Request`], a [`Context`] records where the router sent it:
//! the controller path and action that matched, the positional parameters
//! after the action, and how many internal forwards led here.

use crate::Request;

/// Per-request state: the request plus the route that matched it.
pub struct Context {
    request: Request,
    controller_path: String,
    action: String,
    params: Vec<String>,
    hops: usize,
}

impl Context {
    /// Creates a context for a direct (non-forwarded) dispatch.
    pub fn new(
        request: Request,
        controller_path: impl Into<String>,
        action: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            request,
            controller_path: controller_path.into(),
            action: action.into(),
            params,
            hops: 0,
        }
    }

    /// Sets how many internal forwards preceded this dispatch.
    #[must_use]
    pub fn with_hops(mut self, hops: usize) -> Self {
        self.hops = hops;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the matched controller path, e.g. `admin/users`.
    pub fn controller_path(&self) -> &str {
        &self.controller_path
    }

    /// Returns the matched action, e.g. `edit`.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the positional parameters following the action.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Returns the parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Returns the number of internal forwards that led to this dispatch.
    pub fn hops(&self) -> usize {
        self.hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_accessors() {
        let ctx = Context::new(
            Request::get("/admin/users/edit/7"),
            "admin/users",
            "edit",
            vec!["7".into()],
        )
        .with_hops(2);
        assert_eq!(ctx.controller_path(), "admin/users");
        assert_eq!(ctx.action(), "edit");
        assert_eq!(ctx.param(0), Some("7"));
        assert_eq!(ctx.param(1), None);
        assert_eq!(ctx.hops(), 2);
    }
}
