//! Controller/action dispatch with internal forwards.
//!
//! Handlers are registered per `(controller path, action)`. A request path is
//! resolved as
//!
//! ```text
//! /<controller path...>/<action>/<param>/<param>...
//! ```
//!
//! | Request path            | Controller path | Action  | Params  |
//! |-------------------------|-----------------|---------|---------|
//! | `/`                     | `index`         | `index` |         |
//! | `/users`                | `users`         | `index` |         |
//! | `/users/edit/3`         | `users`         | `edit`  | `3`     |
//! | `/admin/users/edit/3`   | `admin/users`   | `edit`  | `3`     |
//!
//! The longest registered controller path wins; among equal lengths, the
//! first registration wins.
//!
//! A handler may return [`Redirect::internal`](crate::redirect::Redirect::internal);
//! the router then dispatches the target within the same call, counting hops
//! in the [`Context`]. Past [`MAX_FORWARDS`] hops the dispatch fails with
//! [`RouteError::CyclicForward`].

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::context::Context;
use crate::redirect::MAX_FORWARDS;
use crate::{Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response> + Send`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Errors produced while dispatching.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no action registered for {path}")]
    NotFound { path: String },

    #[error("cyclic internal routing detected after {hops} forwards")]
    CyclicForward { hops: usize },

    #[error("invalid internal route argument {arg:?}")]
    InvalidRoute { arg: String },
}

const DEFAULT_SEGMENT: &str = "index";

struct Route {
    segments: Vec<String>,
    controller_path: String,
    action: String,
    handler: Handler,
}

/// Dispatches requests to controller actions.
///
/// # Examples
///
/// ```rust,no_run
/// use nixcache::context::Context;
/// use nixcache::{Response, Router, StatusCode};
/// use nixcache::redirect::{InternalRoute, Redirect};
///
/// let mut router = Router::new();
/// router.action("users", "index", |_ctx: Context| async { Response::new(StatusCode::Ok).body("users") });
/// router.action("users", "legacy", |_ctx: Context| async {
///     Redirect::internal(InternalRoute::new().action("index"))
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    fallback: Option<Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `action` of the controller at `controller_path`
    /// (e.g. `"admin/users"`). Surrounding slashes are ignored.
    pub fn action(&mut self, controller_path: &str, action: &str, handler: impl IntoHandler) {
        let segments: Vec<String> = controller_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));

        self.routes.push(Route {
            controller_path: segments.join("/"),
            segments,
            action: action.trim_matches('/').to_owned(),
            handler,
        });
    }

    /// Sets the handler for requests no action matches. Its context has an
    /// empty controller path and action, and every path segment as a
    /// parameter. Forwards to unknown actions are not routed to it.
    pub fn fallback(&mut self, handler: impl IntoHandler) {
        self.fallback = Some(Arc::new(move |ctx| handler.call(ctx)));
    }

    /// Dispatches `request`, following internal forwards.
    ///
    /// # Errors
    ///
    /// - [`RouteError::NotFound`]: no action matches the path or a forward target.
    /// - [`RouteError::CyclicForward`]: more than [`MAX_FORWARDS`] forwards.
    pub async fn dispatch(&self, request: Request) -> Result<Response, RouteError> {
        let Some((mut route, mut params)) = self.resolve(request.path()) else {
            return self.unmatched(request).await;
        };
        let mut hops = 0;

        loop {
            debug!(
                controller = %route.controller_path,
                action = %route.action,
                hops,
                "dispatching action"
            );
            let ctx = Context::new(
                request.clone(),
                route.controller_path.as_str(),
                route.action.as_str(),
                params,
            )
            .with_hops(hops);

            let mut response = (route.handler)(ctx).await;
            let Some(target) = response.take_forward() else {
                return Ok(response);
            };

            hops += 1;
            if hops > MAX_FORWARDS {
                error!(
                    hops,
                    controller = %route.controller_path,
                    action = %route.action,
                    "cyclic internal routing detected"
                );
                return Err(RouteError::CyclicForward { hops });
            }

            let controller_path = target
                .target_controller_path()
                .unwrap_or_else(|| route.controller_path.clone());
            let action = target.target_action().unwrap_or(&route.action).to_owned();

            route = self
                .find(&controller_path, &action)
                .ok_or_else(|| RouteError::NotFound {
                    path: format!("{controller_path}/{action}"),
                })?;
            params = target.params().to_vec();
        }
    }

    /// Dispatches `request` and converts failures into responses:
    /// `404 Not Found` for unmatched paths, `500 Internal Server Error` otherwise.
    pub async fn route(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(RouteError::NotFound { .. }) => Response::new(StatusCode::NotFound),
            Err(e) => Response::new(StatusCode::InternalServerError).body(e.to_string()),
        }
    }

    async fn unmatched(&self, request: Request) -> Result<Response, RouteError> {
        let Some(fallback) = &self.fallback else {
            return Err(RouteError::NotFound {
                path: request.path().to_owned(),
            });
        };
        debug!(path = %request.path(), "no action matched, using fallback");
        let params = segments(request.path()).map(str::to_owned).collect();
        Ok(fallback(Context::new(request, "", "", params)).await)
    }

    fn resolve(&self, path: &str) -> Option<(&Route, Vec<String>)> {
        let mut segments: Vec<&str> = segments(path).collect();
        if segments.is_empty() {
            segments.push(DEFAULT_SEGMENT);
        }

        let mut best: Option<&Route> = None;
        for route in &self.routes {
            let depth = route.segments.len();
            if segments.len() < depth
                || !route.segments.iter().zip(&segments).all(|(a, b)| a == b)
            {
                continue;
            }
            let action = segments.get(depth).copied().unwrap_or(DEFAULT_SEGMENT);
            if action != route.action {
                continue;
            }
            if best.is_none_or(|current| depth > current.segments.len()) {
                best = Some(route);
            }
        }

        let route = best?;
        let params = segments
            .iter()
            .skip(route.segments.len() + 1)
            .map(|s| (*s).to_owned())
            .collect();
        Some((route, params))
    }

    fn find(&self, controller_path: &str, action: &str) -> Option<&Route> {
        let controller_path = controller_path.trim_matches('/');
        self.routes
            .iter()
            .find(|route| route.controller_path == controller_path && route.action == action)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
