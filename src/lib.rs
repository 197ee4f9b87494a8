//! Proxy control & transformation resolution engine.
//!
//! Sits behind an intercepting proxy and lets out-of-band control
//! directives (query parameters or `mitm-` cookies) swap the intercepted
//! response for a transformed rendition fetched from a remote
//! content-filtering service, with cache-aside storage around the remote
//! call and uniform error containment.

pub mod cache;
pub mod command;
pub mod config;
pub mod constants;
pub mod cookie;
pub mod directive;
pub mod flow;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod remote;
pub mod resolver;
pub mod str_utils;
pub mod types;

pub use types::*;

pub use config::{AppState, Args, RemoteConfig};
