pub mod booking_writer;
pub mod catalog_reader;
pub mod command_reader;
pub mod replay;
