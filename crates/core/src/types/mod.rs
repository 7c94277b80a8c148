//! Core type definitions.

mod cart;
mod email;
mod id;
mod notification;
mod order;
mod price;
mod status;
mod tracking;

pub use cart::*;
pub use email::*;
pub use id::*;
pub use notification::*;
pub use order::*;
pub use price::*;
pub use status::*;
pub use tracking::*;
