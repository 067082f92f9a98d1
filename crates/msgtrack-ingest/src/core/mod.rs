mod database;
mod json;
mod lookup;
mod reader;
mod sink;
mod udp_listener;
mod writer;

pub use reader::run_file_reader;
pub use udp_listener::run_udp_listener;
pub use writer::{Output, run_writer};
