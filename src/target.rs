use std::cell::{Cell, Ref as Borrow, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::key::{ContainerKind, Key, TargetId, MAX_LENGTH};
use crate::proxy::{Flavor, ProxyInner};
use crate::runtime::try_with_runtime;
use crate::Value;

pub type Fields = IndexMap<Key, Value, FxBuildHasher>;

/// Payload of a raw aggregate.
pub enum Shape {
	Record(Fields),
	Sequence(Vec<Value>),
	Map(Fields),
}

impl Shape {
	pub fn kind(&self) -> ContainerKind {
		match self {
			Shape::Record(_) => ContainerKind::Record,
			Shape::Sequence(_) => ContainerKind::Sequence,
			Shape::Map(_) => ContainerKind::Map,
		}
	}
}

pub(crate) struct TargetInner {
	id: TargetId,
	data: RefCell<Shape>,
	skip: Cell<bool>,
	/// One weak slot per wrapper flavor, so wrapping is idempotent without
	/// the raw object keeping its wrappers alive.
	pub(crate) proxies: RefCell<[Weak<ProxyInner>; Flavor::COUNT]>,
}

impl Drop for TargetInner {
	fn drop(&mut self) {
		let id = self.id;
		try_with_runtime(|rt| rt.graph.release(id));
	}
}

/// A raw aggregate. Reads and writes on a `Target` are never tracked; wrap
/// it with `reactive` / `readonly` to intercept them.
#[derive(Clone)]
pub struct Target {
	pub(crate) inner: Rc<TargetInner>,
}

impl Target {
	pub fn new(shape: Shape) -> Self {
		Target {
			inner: Rc::new(TargetInner {
				id: TargetId::new(shape.kind()),
				data: RefCell::new(shape),
				skip: Cell::new(false),
				proxies: RefCell::new(Default::default()),
			}),
		}
	}

	pub fn record() -> Self {
		Self::new(Shape::Record(Fields::default()))
	}

	pub fn record_from<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<Key>,
		V: Into<Value>,
	{
		Self::new(Shape::Record(collect_fields(fields)))
	}

	pub fn sequence<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
		Self::new(Shape::Sequence(items.into_iter().map(Into::into).collect()))
	}

	pub fn map() -> Self {
		Self::new(Shape::Map(Fields::default()))
	}

	pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<Key>,
		V: Into<Value>,
	{
		Self::new(Shape::Map(collect_fields(entries)))
	}

	#[inline]
	pub fn id(&self) -> TargetId {
		self.inner.id
	}

	#[inline]
	pub fn kind(&self) -> ContainerKind {
		self.inner.id.kind()
	}

	/// Never wrap this target; nested reads hand it out raw.
	pub fn mark_raw(&self) {
		self.inner.skip.set(true);
	}

	pub fn is_marked_raw(&self) -> bool {
		self.inner.skip.get()
	}

	pub fn ptr_eq(&self, other: &Target) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub fn shape(&self) -> Borrow<'_, Shape> {
		self.inner.data.borrow()
	}

	pub fn get(&self, key: &Key) -> Value {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => fields.get(key).cloned().unwrap_or_default(),
			Shape::Sequence(items) => match key {
				Key::Index(i) => items.get(*i).cloned().unwrap_or_default(),
				key if key.is_length() => Value::from(items.len()),
				_ => Value::Undefined,
			},
		}
	}

	/// Own-key membership. For sequences: an index below the length, or
	/// `length` itself.
	pub fn has(&self, key: &Key) -> bool {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => fields.contains_key(key),
			Shape::Sequence(items) => match key {
				Key::Index(i) => *i < items.len(),
				key => key.is_length(),
			},
		}
	}

	/// Raw write. Sequences grow to fit an index write and resize on a
	/// `length` write; any other key on a sequence is rejected.
	pub fn set(&self, key: Key, value: Value) -> bool {
		let mut data = self.inner.data.borrow_mut();
		match &mut *data {
			Shape::Record(fields) | Shape::Map(fields) => {
				fields.insert(key, value);
			}
			Shape::Sequence(items) => match key {
				Key::Index(i) if i < MAX_LENGTH => {
					if i >= items.len() && !resize(items, i + 1) {
						return false;
					}
					items[i] = value;
				}
				key if key.is_length() => match value.as_length() {
					Some(length) => return resize(items, length),
					None => return false,
				},
				_ => return false,
			},
		}
		true
	}

	/// Raw delete. A sequence slot becomes `Undefined`; its length stays.
	pub fn delete(&self, key: &Key) -> bool {
		let mut data = self.inner.data.borrow_mut();
		match &mut *data {
			Shape::Record(fields) | Shape::Map(fields) => {
				fields.shift_remove(key);
			}
			Shape::Sequence(items) => match key {
				Key::Index(i) if *i < items.len() => items[*i] = Value::Undefined,
				key if key.is_length() => return false,
				_ => {}
			},
		}
		true
	}

	pub fn clear(&self) {
		match &mut *self.inner.data.borrow_mut() {
			Shape::Record(fields) | Shape::Map(fields) => fields.clear(),
			Shape::Sequence(items) => items.clear(),
		}
	}

	pub fn keys(&self) -> Vec<Key> {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => fields.keys().cloned().collect(),
			Shape::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
		}
	}

	pub fn values(&self) -> Vec<Value> {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => fields.values().cloned().collect(),
			Shape::Sequence(items) => items.clone(),
		}
	}

	pub fn entries(&self) -> Vec<(Key, Value)> {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => {
				fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
			}
			Shape::Sequence(items) => items
				.iter()
				.enumerate()
				.map(|(i, v)| (Key::Index(i), v.clone()))
				.collect(),
		}
	}

	/// Entry count: sequence length, or number of fields.
	pub fn len(&self) -> usize {
		match &*self.inner.data.borrow() {
			Shape::Record(fields) | Shape::Map(fields) => fields.len(),
			Shape::Sequence(items) => items.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Run `func` over the raw sequence items. Non-sequences see an empty
	/// slice.
	pub(crate) fn with_items<R>(&self, func: impl FnOnce(&[Value]) -> R) -> R {
		match &*self.inner.data.borrow() {
			Shape::Sequence(items) => func(items),
			_ => func(&[]),
		}
	}
}

fn collect_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Fields
where
	K: Into<Key>,
	V: Into<Value>,
{
	fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Resize a sequence's storage, failing instead of aborting when the
/// allocation cannot be made.
fn resize(items: &mut Vec<Value>, length: usize) -> bool {
	if length > items.len() && items.try_reserve(length - items.len()).is_err() {
		return false;
	}
	items.resize(length, Value::Undefined);
	true
}

impl fmt::Debug for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}#{}", self.kind(), self.id().serial())
	}
}
