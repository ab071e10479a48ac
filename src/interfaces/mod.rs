//! Outer adapters: the CSV script format and the replay driver used by the
//! command-line tool.

pub mod csv;
pub mod replay;
