//! Strongly typed profile keys used to partition persisted tokens.

// std
use std::{borrow::Borrow, env, ops::Deref};
// self
use crate::_prelude::*;

/// Environment variable consulted by [`ProfileId::from_env`].
pub const PROFILE_VAR: &str = "WS_USERNAME";
/// Profile name used when no username is known.
pub const DEFAULT_PROFILE: &str = "default";

const PROFILE_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier exceeded the allowed byte count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

/// Key under which a session's tokens are persisted (usually the login e-mail).
///
/// Every [`SecretStore`](crate::store::SecretStore) receives the same key, so a keychain entry
/// and a file entry written for one login never collide with another login's tokens.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileId(String);
impl ProfileId {
	/// Creates a new profile key after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// The fallback profile shared by sessions that never saw a username.
	pub fn default_profile() -> Self {
		Self(DEFAULT_PROFILE.to_owned())
	}

	/// Resolves the profile from `WS_USERNAME`, falling back to [`DEFAULT_PROFILE`].
	pub fn from_env() -> Self {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Uses the username when it forms a valid key, otherwise the default profile.
	pub fn for_username(username: &str) -> Self {
		Self::new(username).unwrap_or_else(|_| Self::default_profile())
	}

	pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		lookup(PROFILE_VAR)
			.and_then(|value| Self::new(value.trim()).ok())
			.unwrap_or_else(Self::default_profile)
	}
}
impl Default for ProfileId {
	fn default() -> Self {
		Self::default_profile()
	}
}
impl Deref for ProfileId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ProfileId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for ProfileId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<ProfileId> for String {
	fn from(value: ProfileId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ProfileId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Debug for ProfileId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Profile({})", self.0)
	}
}
impl Display for ProfileId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for ProfileId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	const KIND: &str = "Profile";

	if view.is_empty() {
		return Err(IdentifierError::Empty { kind: KIND });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind: KIND });
	}
	if view.len() > PROFILE_MAX_LEN {
		return Err(IdentifierError::TooLong { kind: KIND, max: PROFILE_MAX_LEN });
	}

	Ok(())
}
