//! Component C5: job orchestrator HTTP/WS surface. The router is built
//! from a library so integration tests can exercise it directly
//! (grounded on `sem_os_server`'s `lib.rs` + `router::build_router`
//! split, the pack's other axum-service example).

pub mod auth;
pub mod error;
pub mod router;
pub mod routes;
pub mod settings;
pub mod state;
