mod connection;
mod table;
mod task;

pub use connection::*;
pub use table::*;
pub use task::*;
