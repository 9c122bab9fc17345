#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Palaver backend: push subscription registry, change-stream fan-out,
//! message snapshots, and the ambient HTTP surface around them.

pub mod app_state;
mod db;
mod http;
mod listener;
mod middleware;
pub mod openapi;
mod routes;
pub mod server;
pub mod services;
mod tracer;
