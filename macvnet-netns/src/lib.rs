//! Network namespace handles for container attachment
//!
//! A [`NetNs`] is an open network namespace. Work that must happen inside it
//! goes through [`NetNs::run`], which performs the namespace switch on a
//! throwaway OS thread so the caller's own thread never changes namespace.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod handle;

pub use handle::{NamespaceHandle, NetNs};
