//! HTTP handlers for the proxy.

pub mod proxy;
