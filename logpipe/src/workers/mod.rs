//! Traits shared by background workers.

pub mod base;
