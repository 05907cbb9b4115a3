//! Page caching behind a small controller router.
//!
//! Run with:
//!
//! ```text
//! RUST_LOG=nixcache=debug cargo run --example page_cache
//! ```
//!
//! Set `NIXCACHE_DIR` to keep the cache between runs; otherwise a scratch
//! directory is used.

use std::sync::Arc;

use nixcache::cache::{CacheConfig, CacheKey, ENV_DIR, FileCache, Lifetime};
use nixcache::context::Context;
use nixcache::redirect::{InternalRoute, Redirect};
use nixcache::{Request, Response, Router, StatusCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("page_cache=info".parse()?))
        .init();

    let scratch = tempfile::tempdir()?;
    let config = match std::env::var_os(ENV_DIR) {
        Some(_) => CacheConfig::from_env()?,
        None => CacheConfig::new(scratch.path()),
    };
    let cache = Arc::new(FileCache::open(config).await?);
    info!(dir = %cache.dir().display(), "cache ready");

    let mut router = Router::new();

    let pages = Arc::clone(&cache);
    router.action("articles", "show", move |ctx: Context| {
        let cache = Arc::clone(&pages);
        async move {
            let Some(slug) = ctx.param(0).map(str::to_owned) else {
                return Redirect::from_context(&ctx).to_action("index");
            };
            let key = match CacheKey::with_group(slug.as_str(), "articles") {
                Ok(key) => key,
                Err(e) => return Response::new(StatusCode::BadRequest).body(e.to_string()),
            };
            let lifetime: Lifetime = match "+10 minutes".parse() {
                Ok(lifetime) => lifetime,
                Err(e) => return Response::new(StatusCode::InternalServerError).body(e.to_string()),
            };
            match cache
                .get_or_save_with(&key, lifetime, || async move {
                    info!(%slug, "rendering article");
                    format!("<article>{slug}</article>")
                })
                .await
            {
                Ok(page) => Response::new(StatusCode::Ok)
                    .header("Content-Type", "text/html")
                    .body_bytes(page.to_vec()),
                Err(e) => Response::new(StatusCode::InternalServerError).body(e.to_string()),
            }
        }
    });

    router.action("articles", "index", |_ctx: Context| async {
        Response::new(StatusCode::Ok).body("all articles")
    });

    // Old URLs are served by the new action without a client round trip.
    router.action("blog", "post", |ctx: Context| async move {
        let mut route = InternalRoute::new().controller("articles").action("show");
        if let Some(slug) = ctx.param(0) {
            route = route.param(slug);
        }
        Redirect::internal(route)
    });

    let purge = Arc::clone(&cache);
    router.action("admin/cache", "clean", move |ctx: Context| {
        let cache = Arc::clone(&purge);
        async move {
            match cache.clean(ctx.param(0)).await {
                Ok(removed) => Redirect::new()
                    .flash(format!("{removed} cached pages removed"))
                    .to("/admin"),
                Err(e) => Response::new(StatusCode::InternalServerError).body(e.to_string()),
            }
        }
    });

    for path in [
        "/articles/show/hello-world",
        "/articles/show/hello-world",
        "/blog/post/hello-world",
        "/articles/show",
        "/admin/cache/clean/articles",
        "/missing",
    ] {
        let response = router.route(Request::get(path)).await;
        info!(
            path,
            status = response.status().as_u16(),
            location = response.headers().get("location").unwrap_or("-"),
            body = %String::from_utf8_lossy(response.body_ref()),
            "handled"
        );
    }

    Ok(())
}
