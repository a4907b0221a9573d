use std::fmt;
use std::rc::Rc;

use crate::key::MAX_LENGTH;
use crate::{Key, Proxy, Ref, Target};

/// A dynamically shaped value stored in, and read from, tracked objects.
///
/// Aggregates are either raw (`Object`) or wrapped (`Proxy`); the two are
/// distinct identities. `PartialEq` is same-value equality: `NaN` equals
/// `NaN` and aggregates compare by identity.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	Str(Rc<str>),
	Object(Target),
	Proxy(Proxy),
	Ref(Ref),
}

impl Value {
	/// Same-value equality. Distinguishes `+0` from `-0`.
	pub fn is(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => {
				if a.is_nan() && b.is_nan() {
					true
				} else {
					a == b && a.is_sign_negative() == b.is_sign_negative()
				}
			}
			_ => self.identity_eq(other),
		}
	}

	/// Like `is`, but `+0` equals `-0`. Backs `includes`.
	pub fn same_value_zero(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
			_ => self.identity_eq(other),
		}
	}

	/// `NaN` never equals anything. Backs `index_of`.
	pub fn strict_equals(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => a == b,
			_ => self.identity_eq(other),
		}
	}

	fn identity_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
			(Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
			(Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
			_ => false,
		}
	}

	/// Whether a write of `new` over `old` is an observable change.
	#[inline]
	pub fn has_changed(new: &Value, old: &Value) -> bool {
		!new.is(old)
	}

	/// Raw or wrapped aggregate.
	pub fn is_object(&self) -> bool {
		matches!(self, Value::Object(_) | Value::Proxy(_))
	}

	pub fn is_ref(&self) -> bool {
		matches!(self, Value::Ref(_))
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_target(&self) -> Option<&Target> {
		match self {
			Value::Object(target) => Some(target),
			_ => None,
		}
	}

	pub fn as_proxy(&self) -> Option<&Proxy> {
		match self {
			Value::Proxy(proxy) => Some(proxy),
			_ => None,
		}
	}

	pub fn as_ref_cell(&self) -> Option<&Ref> {
		match self {
			Value::Ref(r) => Some(r),
			_ => None,
		}
	}

	/// A valid sequence length: an integral number in `0..=MAX_LENGTH`.
	pub(crate) fn as_length(&self) -> Option<usize> {
		match self {
			Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_LENGTH as f64 => Some(*n as usize),
			_ => None,
		}
	}

	/// Read `key`, tracked when `self` is a reactive wrapper.
	pub fn get(&self, key: impl Into<Key>) -> Value {
		match self {
			Value::Proxy(proxy) => proxy.get(key),
			Value::Object(target) => target.get(&key.into()),
			_ => Value::Undefined,
		}
	}

	/// Write `key`, triggering when `self` is a reactive wrapper.
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
		match self {
			Value::Proxy(proxy) => proxy.set(key, value),
			Value::Object(target) => target.set(key.into(), value.into()),
			_ => false,
		}
	}

	pub fn delete(&self, key: impl Into<Key>) -> bool {
		match self {
			Value::Proxy(proxy) => proxy.delete(key),
			Value::Object(target) => target.delete(&key.into()),
			_ => false,
		}
	}

	pub fn has(&self, key: impl Into<Key>) -> bool {
		match self {
			Value::Proxy(proxy) => proxy.has(key),
			Value::Object(target) => target.has(&key.into()),
			_ => false,
		}
	}

	pub fn keys(&self) -> Vec<Key> {
		match self {
			Value::Proxy(proxy) => proxy.keys(),
			Value::Object(target) => target.keys(),
			_ => Vec::new(),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.is(other)
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Null => f.write_str("null"),
			Value::Bool(b) => write!(f, "{}", b),
			Value::Number(n) => write!(f, "{}", n),
			Value::Str(s) => write!(f, "{:?}", s),
			Value::Object(target) => target.fmt(f),
			Value::Proxy(proxy) => proxy.fmt(f),
			Value::Ref(r) => r.fmt(f),
		}
	}
}

macro_rules! from_number {
	($($t:ty),*) => {
		$(impl From<$t> for Value {
			fn from(n: $t) -> Self {
				Value::Number(n as f64)
			}
		})*
	};
}

from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::Str(Rc::from(s))
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::Str(Rc::from(s))
	}
}

impl From<Target> for Value {
	fn from(target: Target) -> Self {
		Value::Object(target)
	}
}

impl From<Proxy> for Value {
	fn from(proxy: Proxy) -> Self {
		Value::Proxy(proxy)
	}
}

impl From<Ref> for Value {
	fn from(r: Ref) -> Self {
		Value::Ref(r)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nan_is_nan() {
		let nan = Value::from(f64::NAN);
		assert!(nan.is(&Value::from(f64::NAN)));
		assert!(!Value::has_changed(&nan, &Value::from(f64::NAN)));
		assert!(!nan.strict_equals(&nan));
		assert!(nan.same_value_zero(&nan));
	}

	#[test]
	fn signed_zero() {
		let pos = Value::from(0.0);
		let neg = Value::from(-0.0);
		assert!(!pos.is(&neg));
		assert!(pos.same_value_zero(&neg));
		assert!(pos.strict_equals(&neg));
	}

	#[test]
	fn aggregates_compare_by_identity() {
		let a = Target::record();
		let b = Target::record();
		assert_eq!(Value::from(a.clone()), Value::from(a));
		assert_ne!(Value::from(b), Value::from(Target::record()));
		assert_eq!(Value::from("x"), Value::from("x".to_string()));
	}

	#[test]
	fn lengths() {
		assert_eq!(Value::from(3).as_length(), Some(3));
		assert_eq!(Value::from(-1).as_length(), None);
		assert_eq!(Value::from(1.5).as_length(), None);
		assert_eq!(Value::from("3").as_length(), None);
		assert_eq!(Value::from(1e20).as_length(), None);
		assert_eq!(Value::from(f64::INFINITY).as_length(), None);
		assert_eq!(Value::from(u32::MAX).as_length(), Some(MAX_LENGTH));
	}
}
