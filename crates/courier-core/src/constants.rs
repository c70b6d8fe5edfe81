//! Package-level constants.

/// Current version of the Courier relay (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "courier";

/// Reserved participant identity of the coordinating World process.
pub const WORLD_ID: &str = "[World]";

/// Payload of the `socket_open` frame sent once a connection is set up.
pub const SOCKET_OPEN_GREETING: &str = "Socket is open!";
