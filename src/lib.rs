//! # nixcache
//!
//! A filesystem page cache with time-based expiry, plus the redirect and
//! internal-forward helpers controllers use around it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nixcache::cache::{CacheConfig, CacheKey, FileCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = FileCache::open(CacheConfig::new("temp/cache")).await?;
//!     let key = CacheKey::with_group("home", "pages")?;
//!
//!     let page = cache
//!         .get_or_save_with(&key, "+1 hour".parse()?, || async { "<h1>Hello</h1>" })
//!         .await?;
//!     println!("{}", String::from_utf8_lossy(&page));
//!
//!     cache.clean(Some("pages")).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod redirect;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheConfig, CacheError, CacheKey, FileCache, Lifetime};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use redirect::{InternalRoute, Redirect};
pub use router::{RouteError, Router};
