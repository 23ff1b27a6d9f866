//! Wire contract of the remote BWS services (`bioid.services.v1`).
//!
//! Messages and clients follow the shape `tonic-build` emits, committed to the
//! tree so builds do not depend on `protoc`.

#[allow(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
pub mod v1;

pub use v1::*;
