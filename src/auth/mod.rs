//! Authentication and authorization for the HTTP front.

mod middleware;
mod sas;

pub use middleware::*;
pub use sas::*;
