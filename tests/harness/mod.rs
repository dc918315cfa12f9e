//! Test harness utilities for connection and concurrency testing.
//!
//! This module provides loopback peers, a recording client and metrics
//! shared by the integration tests of the rsconn library.

#![allow(dead_code)]

mod client;
mod server;

pub use client::{Event, FailAt, Recorder, TestClient};
pub use metrics::{Latencies, Metrics};
pub use server::{Backlogged, PeerMode, TestServer};
