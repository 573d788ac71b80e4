//! evalctl-gateway: the external HTTP surface of the evaluation control
//! plane. Validates submissions, enqueues work, and proxies log/kill
//! requests to whichever Runner the Routing Index says currently owns an
//! evaluation. Holds no state of its own beyond the narrow `Bus`/`Store`/
//! `Index`/`Queue` handles in [`state::AppState`] — every durable fact
//! lives in the Store, every routing fact lives in the Index.

pub mod api_types;
pub mod errors;
pub mod routes;
pub mod state;
