//! Public redirect surface: host and link resolution plus the HTTP router.

pub mod domain_resolver;
pub mod handlers;
pub mod link_cache;
pub mod middleware;
pub mod orchestrator;
pub mod routes;

pub use domain_resolver::DomainResolver;
pub use link_cache::LinkCache;
pub use orchestrator::{normalize_host, RedirectOutcome, RedirectRequest, RedirectService};
pub use routes::create_redirect_router;
