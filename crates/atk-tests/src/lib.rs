//! Integration test crate for the ATK sound engine.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every atk crate to verify they work together.

#[cfg(test)]
mod common;

#[cfg(test)]
mod scenario;

#[cfg(test)]
mod hardware;

#[cfg(test)]
mod thread;
