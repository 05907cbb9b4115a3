//! Redirect helpers: HTTP redirects and internal forwards.
//!
//! [`Redirect`] builds responses that send the client elsewhere, either right
//! away (`Location` with a 3xx status) or after a delay (`Refresh`).
//! [`Redirect::internal`] instead asks the [`Router`](crate::router::Router)
//! to dispatch another controller action within the same request, without a
//! round trip to the client.
//!
//! Forwards are counted per request. More than [`MAX_FORWARDS`] of them is
//! treated as a routing loop and fails with
//! [`RouteError::CyclicForward`].
//!
//! # Examples
//!
//! ```
//! use nixcache::http::StatusCode;
//! use nixcache::redirect::Redirect;
//!
//! let redirect = Redirect::new().controller_path("admin/users");
//!
//! let response = redirect.to_action("index");
//! assert_eq!(response.status(), StatusCode::Found);
//! assert_eq!(response.headers().get("location"), Some("/admin/users/index"));
//!
//! let later = redirect.after(3).to("/login");
//! assert_eq!(later.headers().get("refresh"), Some("3; url=/login"));
//! ```

use bytes::Bytes;
use tracing::debug;

use crate::context::Context;
use crate::http::{Response, StatusCode};
use crate::router::RouteError;

/// Maximum number of internal forwards within one request.
pub const MAX_FORWARDS: usize = 1000;

/// Builder for client-side redirects.
#[derive(Debug, Clone)]
pub struct Redirect {
    public_path: String,
    controller_path: String,
    status: StatusCode,
    delay: Option<u64>,
    flash: Option<Bytes>,
}

impl Default for Redirect {
    fn default() -> Self {
        Self::new()
    }
}

impl Redirect {
    /// Creates a redirect rooted at `/` answering with `302 Found`.
    pub fn new() -> Self {
        Self {
            public_path: "/".to_owned(),
            controller_path: String::new(),
            status: StatusCode::Found,
            delay: None,
            flash: None,
        }
    }

    /// Creates a redirect relative to the controller that handled `ctx`.
    pub fn from_context(ctx: &Context) -> Self {
        Self::new().controller_path(ctx.controller_path())
    }

    /// Sets the public URL prefix of the application. A trailing `/` is added
    /// when missing.
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        self.public_path = path;
        self
    }

    /// Sets the controller path used by [`to_action`](Self::to_action) and
    /// by [`to`](Self::to) with an empty route.
    #[must_use]
    pub fn controller_path(mut self, path: impl Into<String>) -> Self {
        self.controller_path = path.into().trim_matches('/').to_owned();
        self
    }

    /// Sets the status of immediate redirects (default `302 Found`).
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Delays the redirect by `seconds` using a `Refresh` header. Zero means
    /// redirect immediately.
    #[must_use]
    pub fn after(mut self, seconds: u64) -> Self {
        self.delay = (seconds > 0).then_some(seconds);
        self
    }

    /// Carries output already produced for this request over to the next one.
    #[must_use]
    pub fn flash(mut self, output: impl Into<Bytes>) -> Self {
        self.flash = Some(output.into());
        self
    }

    /// Redirects to `route`, relative to the public path.
    ///
    /// An empty route means the current controller's index. Delayed redirects
    /// answer `200 OK` with a `Refresh` header and let the page render;
    /// immediate ones answer with the configured status, a `Location` header,
    /// an empty body and the flashed output, if any.
    pub fn to(&self, route: &str) -> Response {
        let route = if route.is_empty() {
            format!("{}/", self.controller_path)
        } else {
            route.to_owned()
        };
        let url = format!("{}{}", self.public_path, route.trim_start_matches('/'));

        if let Some(seconds) = self.delay {
            debug!(url = %url, seconds, "delayed redirect");
            return Response::new(StatusCode::Ok).header("Refresh", format!("{seconds}; url={url}"));
        }

        debug!(url = %url, status = self.status.as_u16(), "redirect");
        let response = Response::new(self.status).location(url);
        match &self.flash {
            Some(output) => response.flash(output.clone()),
            None => response,
        }
    }

    /// Redirects to `action` of the current controller.
    pub fn to_action(&self, action: &str) -> Response {
        self.to(&format!("{}/{}", self.controller_path, action.trim_start_matches('/')))
    }

    /// Forwards the request to `route` inside the router.
    pub fn internal(route: InternalRoute) -> Response {
        debug!(?route, "internal forward");
        Response::forward(route)
    }
}

/// Target of an internal forward.
///
/// Unset parts fall back as follows: with a module or controller, the action
/// defaults to `index` (and a module's controller to `index`); with neither,
/// the forward stays on the current controller and, without an action, on
/// the current action.
///
/// # Examples
///
/// ```
/// use nixcache::redirect::InternalRoute;
///
/// let route = InternalRoute::parse(["module: admin", "controller: users", "parameters: 1/2"]).unwrap();
/// assert_eq!(route.target_controller_path().as_deref(), Some("admin/users"));
/// assert_eq!(route.target_action(), Some("index"));
/// assert_eq!(route.params(), ["1", "2"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalRoute {
    module: Option<String>,
    controller: Option<String>,
    action: Option<String>,
    parameters: Vec<String>,
}

impl InternalRoute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `"key: value"` arguments; keys are `module`, `controller`,
    /// `action` and `parameters` (slash-separated).
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidRoute`] for arguments without a colon or with an
    /// unknown key.
    pub fn parse<I, S>(args: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut route = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let invalid = || RouteError::InvalidRoute {
                arg: arg.to_owned(),
            };
            let (key, value) = arg.split_once(':').ok_or_else(invalid)?;
            let value = value.trim();
            route = match key.trim() {
                "module" => route.module(value),
                "controller" => route.controller(value),
                "action" => route.action(value),
                "parameters" => route.parameters(value),
                _ => return Err(invalid()),
            };
        }
        Ok(route)
    }

    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Replaces the parameters with the segments of `path` (`"1/2"`).
    #[must_use]
    pub fn parameters(mut self, path: &str) -> Self {
        self.parameters = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();
        self
    }

    /// Appends a single parameter.
    #[must_use]
    pub fn param(mut self, value: impl Into<String>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Controller path to dispatch to; `None` keeps the current controller.
    pub fn target_controller_path(&self) -> Option<String> {
        match (&self.module, &self.controller) {
            (Some(module), controller) => Some(format!(
                "{module}/{}",
                controller.as_deref().unwrap_or("index")
            )),
            (None, Some(controller)) => Some(controller.clone()),
            (None, None) => None,
        }
    }

    /// Action to dispatch to; `None` keeps the current action.
    pub fn target_action(&self) -> Option<&str> {
        match (&self.action, &self.module, &self.controller) {
            (Some(action), _, _) => Some(action.as_str()),
            (None, None, None) => None,
            _ => Some("index"),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    #[test]
    fn empty_route_goes_to_controller_index() {
        let r = Redirect::new().controller_path("users").to("");
        assert_eq!(r.status(), StatusCode::Found);
        assert_eq!(r.headers().get("Location"), Some("/users/"));
    }

    #[test]
    fn leading_slashes_trimmed_under_public_path() {
        let r = Redirect::new().public_path("/app").to("//login");
        assert_eq!(r.headers().get("location"), Some("/app/login"));
    }

    #[test]
    fn custom_status() {
        let r = Redirect::new()
            .status(StatusCode::MovedPermanently)
            .to("/new-home");
        assert_eq!(r.status(), StatusCode::MovedPermanently);
    }

    #[test]
    fn delayed_redirect_uses_refresh() {
        let r = Redirect::new().after(5).flash("ignored").to("/done");
        assert_eq!(r.status(), StatusCode::Ok);
        assert_eq!(r.headers().get("refresh"), Some("5; url=/done"));
        assert!(!r.headers().contains("location"));
        assert!(r.flash_output().is_none());
    }

    #[test]
    fn zero_delay_is_immediate() {
        let r = Redirect::new().after(0).to("/now");
        assert_eq!(r.headers().get("location"), Some("/now"));
    }

    #[test]
    fn immediate_redirect_carries_flash() {
        let r = Redirect::new().flash("Saved.").to("/list");
        assert_eq!(r.flash_output(), Some(&Bytes::from_static(b"Saved.")));
        assert!(r.body_ref().is_empty());
    }

    #[test]
    fn from_context_uses_matched_controller() {
        let ctx = Context::new(Request::get("/admin/users/edit/3"), "admin/users", "edit", vec![]);
        let r = Redirect::from_context(&ctx).to_action("index");
        assert_eq!(r.headers().get("location"), Some("/admin/users/index"));
    }

    #[test]
    fn internal_builds_forward() {
        let r = Redirect::internal(InternalRoute::new().action("list"));
        assert_eq!(
            r.forward_target().and_then(InternalRoute::target_action),
            Some("list")
        );
    }

    #[test]
    fn route_defaults() {
        let module_only = InternalRoute::new().module("admin");
        assert_eq!(module_only.target_controller_path().as_deref(), Some("admin/index"));
        assert_eq!(module_only.target_action(), Some("index"));

        let controller = InternalRoute::new().controller("users").action("edit");
        assert_eq!(controller.target_controller_path().as_deref(), Some("users"));
        assert_eq!(controller.target_action(), Some("edit"));

        let bare = InternalRoute::new().param("3");
        assert_eq!(bare.target_controller_path(), None);
        assert_eq!(bare.target_action(), None);
        assert_eq!(bare.params(), ["3"]);
    }

    #[test]
    fn parse_rejects_bad_arguments() {
        assert!(matches!(
            InternalRoute::parse(["controller users"]),
            Err(RouteError::InvalidRoute { .. })
        ));
        assert!(matches!(
            InternalRoute::parse(["view: list"]),
            Err(RouteError::InvalidRoute { arg }) if arg == "view: list"
        ));
    }

    #[test]
    fn parse_trims_and_splits() {
        let route = InternalRoute::parse(vec![
            "controller:  posts ".to_string(),
            "action: show".to_string(),
            "parameters: 2024//10/".to_string(),
        ])
        .unwrap();
        assert_eq!(
            route,
            InternalRoute::new()
                .controller("posts")
                .action("show")
                .param("2024")
                .param("10")
        );
    }
}
