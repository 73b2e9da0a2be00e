// ABOUTME: Platform abstraction module for relaybot
// ABOUTME: Re-exports the Matrix implementation of the core transport traits

pub mod matrix;

pub use matrix::{MatrixConnector, MatrixRoom, MatrixTransport};
