//! Tests for the kelp-engine crate.

mod helpers;

mod get;
