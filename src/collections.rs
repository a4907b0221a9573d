use crate::effect::{track, trigger};
use crate::error::{report, ReactiveError};
use crate::handlers::{wrap_nested, ProxyHandler};
use crate::key::{ContainerKind, Key, TrackOp, TriggerOp};
use crate::proxy::{to_raw, Flavor};
use crate::{Proxy, Value};

/// Keyed-collection rules. Unlike records, a map's contents are reached
/// through its operations, so iteration is split into value iteration
/// (`Iterate`) and key iteration (`MapKeyIterate`).
pub(crate) struct CollectionHandler {
	readonly: bool,
	shallow: bool,
}

pub(crate) static MUTABLE_COLLECTION: CollectionHandler = CollectionHandler {
	readonly: false,
	shallow: false,
};
pub(crate) static SHALLOW_COLLECTION: CollectionHandler = CollectionHandler {
	readonly: false,
	shallow: true,
};
pub(crate) static READONLY_COLLECTION: CollectionHandler = CollectionHandler {
	readonly: true,
	shallow: false,
};
pub(crate) static SHALLOW_READONLY_COLLECTION: CollectionHandler = CollectionHandler {
	readonly: true,
	shallow: true,
};

impl CollectionHandler {
	fn wrap(&self, value: Value) -> Value {
		if self.shallow {
			value
		} else {
			wrap_nested(value, self.readonly)
		}
	}

	fn track(&self, proxy: &Proxy, op: TrackOp, key: Key) {
		if !self.readonly {
			track(proxy.id(), op, key);
		}
	}

	fn reject(&self, operation: &'static str) -> bool {
		report(ReactiveError::ReadonlyMutation { operation });
		true
	}
}

impl ProxyHandler for CollectionHandler {
	fn get(&self, proxy: &Proxy, key: &Key) -> Value {
		self.track(proxy, TrackOp::Get, key.clone());
		self.wrap(proxy.target().get(key))
	}

	fn set(&self, proxy: &Proxy, key: Key, value: Value) -> bool {
		if self.readonly {
			return self.reject("set");
		}

		let target = proxy.target();
		let value = to_raw(&value);
		let had_key = target.has(&key);
		let old = target.get(&key);
		target.set(key.clone(), value.clone());

		if !had_key {
			trigger(target.id(), TriggerOp::Add, Some(key), Some(&value), None);
		} else if Value::has_changed(&value, &old) {
			trigger(target.id(), TriggerOp::Set, Some(key), Some(&value), Some(&old));
		}
		true
	}

	fn delete(&self, proxy: &Proxy, key: &Key) -> bool {
		if self.readonly {
			self.reject("delete");
			return false;
		}

		let target = proxy.target();
		let had_key = target.has(key);
		if !had_key {
			return false;
		}
		let old = target.get(key);
		target.delete(key);
		trigger(target.id(), TriggerOp::Delete, Some(key.clone()), None, Some(&old));
		true
	}

	fn has(&self, proxy: &Proxy, key: &Key) -> bool {
		self.track(proxy, TrackOp::Has, key.clone());
		proxy.target().has(key)
	}

	fn own_keys(&self, proxy: &Proxy) -> Vec<Key> {
		self.track(proxy, TrackOp::Iterate, Key::MapKeyIterate);
		proxy.target().keys()
	}
}

fn collection(proxy: &Proxy) -> Option<&'static CollectionHandler> {
	if proxy.kind() != ContainerKind::Map {
		return None;
	}
	Some(match proxy.flavor() {
		Flavor::Reactive => &MUTABLE_COLLECTION,
		Flavor::ShallowReactive => &SHALLOW_COLLECTION,
		Flavor::Readonly => &READONLY_COLLECTION,
		Flavor::ShallowReadonly => &SHALLOW_READONLY_COLLECTION,
	})
}

/// Whole-container operations. On maps these follow collection rules; on
/// records and sequences they are expressed through the ordinary keyed
/// reads, so they are tracked the same way.
impl Proxy {
	/// Number of entries. Tracks the container's shape.
	pub fn len(&self) -> usize {
		match collection(self) {
			Some(handler) => {
				handler.track(self, TrackOp::Iterate, Key::Iterate);
				self.target().len()
			}
			None => match self.kind() {
				ContainerKind::Sequence => self.get(Key::length()).as_length().unwrap_or(0),
				_ => self.keys().len(),
			},
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Alias of `len` for keyed collections.
	pub fn size(&self) -> usize {
		self.len()
	}

	/// Remove every entry of a map. Returns `false` for other containers.
	pub fn clear(&self) -> bool {
		let handler = match collection(self) {
			Some(handler) => handler,
			None => return false,
		};
		if handler.readonly {
			return handler.reject("clear");
		}

		let target = self.target();
		let had_items = !target.is_empty();
		target.clear();
		if had_items {
			trigger(target.id(), TriggerOp::Clear, None, None, None);
		}
		true
	}

	pub fn values(&self) -> Vec<Value> {
		self.entries().into_iter().map(|(_, v)| v).collect()
	}

	/// Entries in insertion order, each value wrapped like a keyed read.
	pub fn entries(&self) -> Vec<(Key, Value)> {
		match collection(self) {
			Some(handler) => {
				handler.track(self, TrackOp::Iterate, Key::Iterate);
				self.target()
					.entries()
					.into_iter()
					.map(|(k, v)| (k, handler.wrap(v)))
					.collect()
			}
			None => self
				.keys()
				.into_iter()
				.map(|k| {
					let v = self.get(k.clone());
					(k, v)
				})
				.collect(),
		}
	}

	pub fn for_each(&self, mut func: impl FnMut(&Value, &Key)) {
		for (key, value) in self.entries() {
			func(&value, &key);
		}
	}
}
