//! Types and traits shared between the asyncfb engine and the
//! client implementations that actually speak to the server

mod client;
mod error;
mod params;
mod row;
mod transaction;
mod value;

pub use client::*;
pub use error::FbError;
pub use params::*;
pub use row::*;
pub use transaction::*;
pub use value::*;
