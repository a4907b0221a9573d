use crate::effect::track;
use crate::error::{report, ReactiveError};
use crate::key::{ContainerKind, Key, TrackOp};
use crate::proxy::to_raw;
use crate::runtime::untracked;
use crate::{Proxy, Value};

/// Array-like operations on a sequence wrapper.
///
/// Searches compare by identity. Because a caller may hold the wrapped
/// form of a raw element, a miss is retried with the argument unwrapped.
///
/// Mutators read and write `length` themselves; they run with tracking
/// suspended so an effect that pushes never ends up depending on the
/// length it just changed.
impl Proxy {
	pub fn includes(&self, value: &Value) -> bool {
		self.search(value, |items, v| items.iter().position(|item| item.same_value_zero(v)))
			.is_some()
	}

	pub fn index_of(&self, value: &Value) -> Option<usize> {
		self.search(value, |items, v| items.iter().position(|item| item.strict_equals(v)))
	}

	pub fn last_index_of(&self, value: &Value) -> Option<usize> {
		self.search(value, |items, v| items.iter().rposition(|item| item.strict_equals(v)))
	}

	fn search<R>(&self, value: &Value, find: impl Fn(&[Value], &Value) -> Option<R>) -> Option<R> {
		let target = self.target();
		if !self.is_readonly() {
			let len = target.len();
			for i in 0..len {
				track(target.id(), TrackOp::Get, Key::Index(i));
			}
			track(target.id(), TrackOp::Get, Key::length());
		}

		target
			.with_items(|items| find(items, value))
			.or_else(|| target.with_items(|items| find(items, &to_raw(value))))
	}

	fn mutable_sequence(&self, operation: &'static str) -> bool {
		if self.kind() != ContainerKind::Sequence {
			return false;
		}
		if self.is_readonly() {
			report(ReactiveError::ReadonlyMutation { operation });
			return false;
		}
		true
	}

	fn length(&self) -> usize {
		self.get(Key::length()).as_length().unwrap_or(0)
	}

	/// Move the element at `from` to `to`, or punch a hole at `to`.
	fn move_item(&self, from: usize, to: usize) {
		if self.has(from) {
			let value = self.get(from);
			self.set(to, value);
		} else {
			self.delete(to);
		}
	}

	/// Write `length`. Shrinking notifies readers of the dropped indices.
	pub fn set_len(&self, len: usize) -> bool {
		if !self.mutable_sequence("set length") {
			return false;
		}
		self.set(Key::length(), len)
	}

	/// Append `items`, returning the new length.
	pub fn push(&self, items: impl IntoIterator<Item = impl Into<Value>>) -> usize {
		if !self.mutable_sequence("push") {
			return self.target().len();
		}
		untracked(|| {
			let mut len = self.length();
			for item in items {
				self.set(len, item);
				len += 1;
			}
			self.set(Key::length(), len);
			len
		})
	}

	pub fn pop(&self) -> Value {
		if !self.mutable_sequence("pop") {
			return Value::Undefined;
		}
		untracked(|| {
			let len = self.length();
			if len == 0 {
				self.set(Key::length(), 0);
				return Value::Undefined;
			}
			let last = len - 1;
			let value = self.get(last);
			self.delete(last);
			self.set(Key::length(), last);
			value
		})
	}

	pub fn shift(&self) -> Value {
		if !self.mutable_sequence("shift") {
			return Value::Undefined;
		}
		untracked(|| {
			let len = self.length();
			if len == 0 {
				self.set(Key::length(), 0);
				return Value::Undefined;
			}
			let first = self.get(0usize);
			for k in 1..len {
				self.move_item(k, k - 1);
			}
			self.delete(len - 1);
			self.set(Key::length(), len - 1);
			first
		})
	}

	/// Prepend `items`, returning the new length.
	pub fn unshift(&self, items: impl IntoIterator<Item = impl Into<Value>>) -> usize {
		if !self.mutable_sequence("unshift") {
			return self.target().len();
		}
		let items: Vec<Value> = items.into_iter().map(Into::into).collect();
		untracked(|| {
			let len = self.length();
			let count = items.len();
			if count > 0 {
				for k in (1..=len).rev() {
					self.move_item(k - 1, k + count - 1);
				}
				for (j, item) in items.into_iter().enumerate() {
					self.set(j, item);
				}
			}
			self.set(Key::length(), len + count);
			len + count
		})
	}

	/// Remove `delete_count` elements at `start` and insert `items` in
	/// their place. A negative `start` counts from the end. Returns the
	/// removed elements.
	pub fn splice(
		&self,
		start: isize,
		delete_count: usize,
		items: impl IntoIterator<Item = impl Into<Value>>,
	) -> Vec<Value> {
		if !self.mutable_sequence("splice") {
			return Vec::new();
		}
		let items: Vec<Value> = items.into_iter().map(Into::into).collect();
		untracked(|| {
			let len = self.length();
			let start = if start < 0 {
				len.saturating_sub(start.unsigned_abs())
			} else {
				(start as usize).min(len)
			};
			let delete_count = delete_count.min(len - start);
			let count = items.len();

			let removed = (0..delete_count)
				.map(|k| self.get(start + k))
				.collect::<Vec<_>>();

			if count < delete_count {
				for k in start..(len - delete_count) {
					self.move_item(k + delete_count, k + count);
				}
				for k in ((len - delete_count + count)..len).rev() {
					self.delete(k);
				}
			} else if count > delete_count {
				for k in ((start + 1)..=(len - delete_count)).rev() {
					self.move_item(k + delete_count - 1, k + count - 1);
				}
			}

			for (j, item) in items.into_iter().enumerate() {
				self.set(start + j, item);
			}
			self.set(Key::length(), len - delete_count + count);
			removed
		})
	}
}
