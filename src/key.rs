use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);
static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// The closed set of container shapes the interception layer understands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ContainerKind {
	Record,
	Sequence,
	Map,
}

/// Stable identity of a trackable object inside the dependency graph.
///
/// Identity is the serial alone; the container kind rides along so that
/// `trigger` can resolve length and iteration semantics without looking
/// the object up.
#[derive(Clone, Copy, Debug)]
pub struct TargetId {
	serial: u64,
	kind: ContainerKind,
}

impl TargetId {
	pub fn new(kind: ContainerKind) -> Self {
		TargetId {
			serial: NEXT_TARGET.fetch_add(1, Ordering::Relaxed),
			kind,
		}
	}

	#[inline]
	pub fn kind(&self) -> ContainerKind {
		self.kind
	}

	#[inline]
	pub fn serial(&self) -> u64 {
		self.serial
	}
}

impl PartialEq for TargetId {
	fn eq(&self, other: &Self) -> bool {
		self.serial == other.serial
	}
}

impl Eq for TargetId {}

impl Hash for TargetId {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.serial)
	}
}

/// Opaque symbolic key. Equality is identity.
#[derive(Clone)]
pub struct Symbol {
	id: u64,
	description: Rc<str>,
	well_known: bool,
}

impl Symbol {
	pub fn new(description: &str) -> Self {
		Self::create(description, false)
	}

	/// An engine-level symbol. Reads of well-known symbols are never tracked.
	pub fn well_known(description: &str) -> Self {
		Self::create(description, true)
	}

	fn create(description: &str, well_known: bool) -> Self {
		Symbol {
			id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
			description: Rc::from(description),
			well_known,
		}
	}

	pub fn description(&self) -> &str {
		&self.description
	}

	pub fn is_well_known(&self) -> bool {
		self.well_known
	}
}

impl PartialEq for Symbol {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for Symbol {}

impl Hash for Symbol {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.id)
	}
}

impl fmt::Debug for Symbol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Symbol({})", self.description)
	}
}

/// Property key on a tracked object.
///
/// `Iterate` and `MapKeyIterate` never name a stored property: they stand
/// for "the shape of this container" in the dependency graph.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Str(Rc<str>),
	Index(usize),
	Symbol(Symbol),
	Iterate,
	MapKeyIterate,
}

const LENGTH: &str = "length";

/// Longest a sequence can be. Valid indices are below it.
pub const MAX_LENGTH: usize = u32::MAX as usize;
const NON_TRACKABLE: [&str; 3] = ["__proto__", "__v_isRef", "__isVue"];

impl Key {
	pub fn length() -> Key {
		Key::Str(Rc::from(LENGTH))
	}

	pub fn is_length(&self) -> bool {
		matches!(self, Key::Str(s) if &**s == LENGTH)
	}

	pub fn as_index(&self) -> Option<usize> {
		match self {
			Key::Index(i) => Some(*i),
			_ => None,
		}
	}

	/// Built-in keys that never produce track events.
	pub fn is_trackable(&self) -> bool {
		match self {
			Key::Symbol(symbol) => !symbol.is_well_known(),
			Key::Str(s) => !NON_TRACKABLE.contains(&&**s),
			_ => true,
		}
	}
}

fn parse_index(s: &str) -> Option<usize> {
	if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
		return None;
	}
	if !s.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	s.parse().ok().filter(|&index| index < MAX_LENGTH)
}

impl From<&str> for Key {
	fn from(s: &str) -> Self {
		match parse_index(s) {
			Some(index) => Key::Index(index),
			None => Key::Str(Rc::from(s)),
		}
	}
}

impl From<String> for Key {
	fn from(s: String) -> Self {
		Key::from(s.as_str())
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Key::Index(index)
	}
}

impl From<Symbol> for Key {
	fn from(symbol: Symbol) -> Self {
		Key::Symbol(symbol)
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(s) => f.write_str(s),
			Key::Index(i) => write!(f, "{}", i),
			Key::Symbol(s) => write!(f, "{:?}", s),
			Key::Iterate => f.write_str("<iterate>"),
			Key::MapKeyIterate => f.write_str("<map key iterate>"),
		}
	}
}

impl fmt::Debug for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(s) => write!(f, "{:?}", s),
			other => fmt::Display::fmt(other, f),
		}
	}
}

/// Classification of a read.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrackOp {
	Get,
	Has,
	Iterate,
}

/// Classification of a write.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerOp {
	Set,
	Add,
	Delete,
	Clear,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonical_integers_become_indices() {
		assert_eq!(Key::from("0"), Key::Index(0));
		assert_eq!(Key::from("42"), Key::Index(42));
		assert_eq!(Key::from("042"), Key::Str(Rc::from("042")));
		assert_eq!(Key::from("-1"), Key::Str(Rc::from("-1")));
		assert!(Key::from("length").is_length());
		assert_eq!(Key::from("4294967294"), Key::Index(4294967294));
		assert_eq!(Key::from("4294967295"), Key::Str(Rc::from("4294967295")));
		assert!(matches!(Key::from("18446744073709551615"), Key::Str(_)));
	}

	#[test]
	fn builtin_keys_are_not_trackable() {
		assert!(!Key::from("__proto__").is_trackable());
		assert!(!Key::Symbol(Symbol::well_known("iterator")).is_trackable());
		assert!(Key::Symbol(Symbol::new("user")).is_trackable());
		assert!(Key::from("name").is_trackable());
	}

	#[test]
	fn symbols_compare_by_identity() {
		let a = Symbol::new("x");
		let b = Symbol::new("x");
		assert_ne!(a, b);
		assert_eq!(a.clone(), a);
	}
}
