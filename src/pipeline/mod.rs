//! Pipeline stages for turning a PDF upload into a story directory.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ split ──▶ segment ──▶ imagegen ──▶ store
//! (temp)     (lopdf)   (chunks)   (5 parts)   (provider)   (story dir)
//! ```
//!
//! 1. [`input`]: validate the file name and stream the bytes into a
//!    scoped temp file under a size cap
//! 2. [`extract`]: load the PDF on the blocking pool, read page count and
//!    text, then drop the temp file
//! 3. [`split`]: recursive single-separator chunking of the raw text
//! 4. [`segment`]: partition the chunked text into the fixed number of
//!    story segments
//! 5. [`imagegen`]: one provider call per segment with timeout, optional
//!    retry and cancellation; the only stage with network I/O
//! 6. [`store`]: per-request `{uuid}` directory holding segment text and
//!    generated images

pub mod extract;
pub mod imagegen;
pub mod input;
pub mod segment;
pub mod split;
pub mod store;
