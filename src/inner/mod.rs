//! Implementation details shared by the public locking APIs.

pub mod raw;
