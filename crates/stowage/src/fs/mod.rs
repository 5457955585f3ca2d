//! Local filesystem helpers used by uploads and downloads.

mod atomic_file;
mod hashing_reader;

pub use atomic_file::{write_atomic, write_atomic_bytes};
pub use hashing_reader::{HashingReader, sha256_hex};
