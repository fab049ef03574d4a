pub mod analytic;
pub mod common;
pub mod operational;
pub mod value;

pub use analytic::*;
pub use common::*;
pub use operational::*;
pub use value::*;
