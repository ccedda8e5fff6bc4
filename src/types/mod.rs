mod access;
mod models;

pub use access::AccessMode;
pub use models::*;
