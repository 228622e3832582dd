// src/handle.rs

//! Handle abstraction shared by the real manager and the in-memory double

use std::fs::File;
use std::io::{Read, Seek, Write};

/// A file-like handle returned from `create` and `open`.
///
/// Write handles address the staged copy only; the target path is untouched
/// until the prepare phase. Callers must drop (close) write handles before
/// the transaction commits. The manager does not track open handles, and
/// an unflushed handle at commit time produces undefined file contents.
pub trait FileHandle: Read + Write + Seek + std::fmt::Debug {}

impl FileHandle for File {}
