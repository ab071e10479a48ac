pub mod command_reader;
pub mod queue_writer;
