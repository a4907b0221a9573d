use std::cell::Cell;

/// Deepest effect nesting that still uses the marker-bit diff. Deeper runs
/// fall back to clearing and rebuilding their dependencies.
pub const MAX_MARKER_BITS: u32 = 30;

/// How many times one job may run within a single flush cycle.
pub const RECURSION_LIMIT: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
	pub max_marker_bits: u32,
	pub recursion_limit: u32,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			max_marker_bits: MAX_MARKER_BITS,
			recursion_limit: RECURSION_LIMIT,
		}
	}
}

impl Config {
	pub fn max_marker_bits(mut self, bits: u32) -> Self {
		self.max_marker_bits = bits.min(MAX_MARKER_BITS);
		self
	}

	pub fn recursion_limit(mut self, limit: u32) -> Self {
		self.recursion_limit = limit;
		self
	}
}

thread_local! {
	static CONFIG: Cell<Config> = Cell::new(Config::default());
}

/// Install `config` for the current thread.
pub fn configure(config: Config) {
	let config = config.max_marker_bits(config.max_marker_bits);
	CONFIG.with(|c| c.set(config));
}

pub fn config() -> Config {
	CONFIG.with(|c| c.get())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn marker_bits_are_clamped() {
		let config = Config::default().max_marker_bits(64);
		assert_eq!(config.max_marker_bits, MAX_MARKER_BITS);
	}
}
