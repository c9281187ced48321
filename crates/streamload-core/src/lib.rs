#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated bindings for the `helloworld` package.
pub mod proto {
    tonic::include_proto!("helloworld");
}
