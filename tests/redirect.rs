use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nixcache::cache::{CacheConfig, CacheKey, FileCache, Lifetime};
use nixcache::context::Context;
use nixcache::redirect::{InternalRoute, MAX_FORWARDS, Redirect};
use nixcache::{Request, Response, RouteError, Router, StatusCode};

fn body(response: &Response) -> String {
    String::from_utf8(response.body_ref().to_vec()).unwrap()
}

#[tokio::test]
async fn forward_loop_is_a_server_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut router = Router::new();
    router.action("a", "index", move |_ctx: Context| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Redirect::internal(InternalRoute::new().controller("b")) }
    });
    router.action("b", "index", |_ctx: Context| async {
        Redirect::internal(InternalRoute::new().controller("a"))
    });

    let err = router.dispatch(Request::get("/a")).await.unwrap_err();
    assert!(matches!(err, RouteError::CyclicForward { hops } if hops == MAX_FORWARDS + 1));
    // a, b, a, b ... over 1001 dispatches starting at a
    assert_eq!(calls.load(Ordering::SeqCst), MAX_FORWARDS / 2 + 1);

    let response = router.route(Request::get("/a")).await;
    assert_eq!(response.status(), StatusCode::InternalServerError);
}

#[tokio::test]
async fn hop_counts_are_per_request() {
    let mut router = Router::new();
    router.action("start", "index", |_ctx: Context| async {
        Redirect::internal(InternalRoute::parse(["controller: end", "parameters: x/y"]).unwrap())
    });
    router.action("end", "index", |ctx: Context| async move {
        Response::new(StatusCode::Ok).body(format!("{} {}", ctx.hops(), ctx.params().join("/")))
    });

    for _ in 0..3 {
        let response = router.route(Request::get("/start")).await;
        assert_eq!(body(&response), "1 x/y");
    }
}

#[tokio::test]
async fn http_redirect_after_cache_clean() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::open(CacheConfig::new(dir.path())).await.unwrap());
    let k = CacheKey::with_group("home", "pages").unwrap();
    cache.save_as(&k, "<h1>home</h1>", Lifetime::Never).await.unwrap();

    let mut router = Router::new();
    let handle = Arc::clone(&cache);
    router.action("admin/cache", "clean", move |ctx: Context| {
        let cache = Arc::clone(&handle);
        async move {
            let removed = cache.clean(ctx.param(0)).await.unwrap();
            Redirect::from_context(&ctx)
                .public_path("/app")
                .flash(format!("removed {removed}"))
                .to_action("index")
        }
    });

    let response = router.route(Request::get("/admin/cache/clean/pages")).await;
    assert_eq!(response.status(), StatusCode::Found);
    assert_eq!(response.headers().get("location"), Some("/app/admin/cache/index"));
    assert_eq!(response.flash_output().map(|b| b.as_ref()), Some(&b"removed 1"[..]));
    assert_eq!(cache.get(&k).await.unwrap(), None);
}

#[tokio::test]
async fn delayed_redirect_renders_page() {
    let mut router = Router::new();
    router.action("session", "logout", |ctx: Context| async move {
        Redirect::from_context(&ctx).after(3).to("")
    });

    let response = router.route(Request::get("/session/logout")).await;
    assert_eq!(response.status(), StatusCode::Ok);
    assert_eq!(response.headers().get("refresh"), Some("3; url=/session/"));
    assert!(!response.headers().contains("location"));
}
