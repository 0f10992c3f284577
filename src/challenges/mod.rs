// Protocol engine: transport, session handshake, response parsing and the attempt loop.

pub mod core;
pub mod parser;
pub mod pipeline;
pub mod session;
