//! External data access: provider seams, HTTP clients, caching and retries.

mod access;
pub mod cache;
pub mod http;
mod provider;
mod retry;

pub use access::DataAccess;
pub use cache::{Cache, CacheTtls, Clock, ManualClock, MemoryCache, SystemClock};
pub use http::{FootballApiClient, OddsApiClient};
pub use provider::{FixtureProvider, OddsProvider, StatsProvider};
pub use retry::RetryPolicy;
