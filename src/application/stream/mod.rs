//! Capture and replay of event streams.
//!
//! Cached pipeline prefixes are stored as compiled event streams: a four byte
//! `TXEV` magic, one format version byte, then the MessagePack encoding of the
//! event sequence.

mod compiler;
mod interpreter;
mod tee;

pub use compiler::{EventCompiler, FORMAT_VERSION, MAGIC};
pub use interpreter::EventInterpreter;
pub use tee::TeeSink;
