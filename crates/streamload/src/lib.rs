#![doc = include_str!("../README.md")]

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod harness;
pub mod health;
pub mod metrics;
pub mod session;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;
