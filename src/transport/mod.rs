pub mod socket;

pub use socket::{connect, endpoint_url, SocketSink, SocketSource};
