//! HTTP API: server wiring, routing, session and admin middleware.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
