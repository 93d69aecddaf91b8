//! Statement-to-voucher pipeline: name matching, routing, assembly and commit

pub mod allocation;
pub mod core;
pub mod executor;
pub mod fee;
pub mod normalize;
pub mod resolver;
pub mod voucher;

pub use allocation::*;
pub use core::*;
pub use executor::*;
pub use fee::*;
pub use normalize::*;
pub use resolver::*;
pub use voucher::*;
