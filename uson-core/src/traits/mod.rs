//! Transport abstraction traits
//!
//! These traits define the interface between the link runtime and the
//! board-specific UART or radio glue.

pub mod stream;

pub use stream::ByteStream;
