//! Credentials, profile identifiers, and token models.

pub mod credential;
pub mod id;
pub mod token;

pub use credential::*;
pub use id::*;
pub use token::{claims::*, pair::*, secret::*};
