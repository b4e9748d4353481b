//! Bearer/refresh token pairs and the helpers that inspect them.

pub mod claims;
pub mod pair;
pub mod secret;
