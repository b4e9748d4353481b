//! Username/password/OTP material consumed by the password grant.

// std
use std::env;
// crates.io
use zeroize::Zeroizing;
// self
use crate::_prelude::*;

/// Environment variable holding the login e-mail.
pub const USERNAME_VAR: &str = "WS_USERNAME";
/// Environment variable holding the password.
pub const PASSWORD_VAR: &str = "WS_PASSWORD";
/// Environment variable holding an optional one-time passcode.
pub const OTP_VAR: &str = "WS_OTP";

/// Login material handed to [`Session::authenticate`](crate::session::Session::authenticate).
///
/// The password and OTP live in zeroizing buffers. The session takes the credential by value
/// and drops it as soon as the exchange finishes, so the secret bytes are scrubbed whether the
/// exchange succeeded or not. Nothing here is ever written to a store.
#[derive(Clone)]
pub struct Credential {
	username: String,
	password: Zeroizing<String>,
	otp: Option<Zeroizing<String>>,
}
impl Credential {
	/// Creates a credential without a one-time passcode.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: Zeroizing::new(password.into()), otp: None }
	}

	/// Attaches a one-time passcode; blank values are ignored.
	pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
		let otp = Zeroizing::new(otp.into());

		self.otp = if otp.trim().is_empty() { None } else { Some(otp) };

		self
	}

	/// Reads `WS_USERNAME`, `WS_PASSWORD`, and the optional `WS_OTP`.
	///
	/// Returns `None` unless both username and password are set and non-empty.
	pub fn from_env() -> Option<Self> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Login e-mail.
	pub fn username(&self) -> &str {
		&self.username
	}

	/// Returns `true` when a one-time passcode is attached.
	pub fn has_otp(&self) -> bool {
		self.otp.is_some()
	}

	/// Returns `true` when both username and password are non-empty.
	pub fn is_complete(&self) -> bool {
		!self.username.trim().is_empty() && !self.password.is_empty()
	}

	pub(crate) fn expose_password(&self) -> &str {
		&self.password
	}

	pub(crate) fn expose_otp(&self) -> Option<&str> {
		self.otp.as_deref().map(String::as_str)
	}

	pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
		let username = lookup(USERNAME_VAR).filter(|value| !value.trim().is_empty())?;
		let password = Zeroizing::new(lookup(PASSWORD_VAR)?);

		if password.is_empty() {
			return None;
		}

		let credential = Self::new(username.trim(), password.as_str());

		Some(match lookup(OTP_VAR) {
			Some(otp) => credential.with_otp(otp),
			None => credential,
		})
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
