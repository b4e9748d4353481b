//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes the validated token endpoint profile (`ProviderDescriptor`): endpoint,
//! public client id, scopes, and the headers the password grant depends on.
//! `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used by the token
//! endpoint facade to augment outgoing JSON bodies and map failures into the session error
//! taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
