use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::runtime::with_runtime;
use crate::Effect;

pub(crate) struct ScopeInner {
	active: Cell<bool>,
	detached: bool,
	effects: RefCell<Vec<Effect>>,
	cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
	scopes: RefCell<Vec<EffectScope>>,
	parent: Option<Weak<ScopeInner>>,
}

/// Groups effects for bulk teardown.
///
/// Effects created inside `run` (or given this scope in their options) are
/// owned by the scope and stopped together with it. Non-detached scopes are
/// likewise owned and stopped by the scope that was active when they were
/// created.
#[derive(Clone)]
pub struct EffectScope {
	inner: Rc<ScopeInner>,
}

impl Default for EffectScope {
	fn default() -> Self {
		Self::new()
	}
}

impl EffectScope {
	pub fn new() -> Self {
		Self::create(false)
	}

	/// A scope that is not collected by the currently active one.
	pub fn detached() -> Self {
		Self::create(true)
	}

	fn create(detached: bool) -> Self {
		let parent = if detached {
			None
		} else {
			with_runtime(|rt| rt.active_scope.borrow().clone())
		};

		let scope = EffectScope {
			inner: Rc::new(ScopeInner {
				active: Cell::new(true),
				detached,
				effects: RefCell::new(Vec::new()),
				cleanups: RefCell::new(Vec::new()),
				scopes: RefCell::new(Vec::new()),
				parent: parent.as_ref().map(Rc::downgrade),
			}),
		};

		if let Some(parent) = parent {
			parent.scopes.borrow_mut().push(scope.clone());
		}
		scope
	}

	pub fn is_active(&self) -> bool {
		self.inner.active.get()
	}

	pub fn effect_count(&self) -> usize {
		self.inner.effects.borrow().len()
	}

	/// Run `func` with this scope active. Returns `None` on a stopped scope.
	pub fn run<R>(&self, func: impl FnOnce() -> R) -> Option<R> {
		if !self.is_active() {
			tracing::warn!("cannot run an inactive effect scope");
			return None;
		}

		let previous = with_runtime(|rt| rt.active_scope.replace(Some(self.inner.clone())));
		let _restore = RestoreScope(previous);
		Some(func())
	}

	pub fn stop(&self) {
		if !self.inner.active.replace(false) {
			return;
		}

		let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
		for effect in &effects {
			effect.stop();
		}

		let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
		for cleanup in cleanups {
			cleanup();
		}

		let scopes = std::mem::take(&mut *self.inner.scopes.borrow_mut());
		for scope in &scopes {
			scope.stop();
		}

		if !self.inner.detached {
			if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
				parent
					.scopes
					.borrow_mut()
					.retain(|s| !Rc::ptr_eq(&s.inner, &self.inner));
			}
		}
	}

	pub fn ptr_eq(&self, other: &EffectScope) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

struct RestoreScope(Option<Rc<ScopeInner>>);

impl Drop for RestoreScope {
	fn drop(&mut self) {
		let previous = self.0.take();
		with_runtime(|rt| *rt.active_scope.borrow_mut() = previous);
	}
}

pub fn get_current_scope() -> Option<EffectScope> {
	with_runtime(|rt| rt.active_scope.borrow().clone()).map(|inner| EffectScope { inner })
}

/// Register `cleanup` to run when the active scope stops.
pub fn on_scope_dispose(cleanup: impl FnOnce() + 'static) {
	match get_current_scope() {
		Some(scope) => scope.inner.cleanups.borrow_mut().push(Box::new(cleanup)),
		None => tracing::warn!("on_scope_dispose called without an active effect scope"),
	}
}

pub(crate) fn record_effect_scope(effect: &Effect, scope: Option<&EffectScope>) {
	let scope = scope.cloned().or_else(get_current_scope);
	if let Some(scope) = scope {
		if scope.is_active() {
			scope.inner.effects.borrow_mut().push(effect.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::effect::{effect, effect_with, EffectOptions};

	#[test]
	fn stop_tears_down_collected_effects() {
		let scope = EffectScope::new();
		let e = scope.run(|| effect(|| {})).unwrap();
		assert_eq!(scope.effect_count(), 1);

		scope.stop();
		assert!(!e.is_active());
		assert!(!scope.is_active());
		assert!(scope.run(|| ()).is_none());
	}

	#[test]
	fn explicit_scope_option() {
		let scope = EffectScope::detached();
		let e = effect_with(|| {}, EffectOptions::default().scope(&scope));
		scope.stop();
		assert!(!e.is_active());
	}

	#[test]
	fn nested_scopes_and_cleanups() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let outer = EffectScope::new();
		let (inner, detached) = outer
			.run(|| {
				let log = log.clone();
				on_scope_dispose(move || log.borrow_mut().push("outer"));
				(EffectScope::new(), EffectScope::detached())
			})
			.unwrap();

		inner.run({
			let log = log.clone();
			move || on_scope_dispose(move || log.borrow_mut().push("inner"))
		});

		outer.stop();
		assert!(!inner.is_active());
		assert!(detached.is_active());
		assert_eq!(log.borrow().as_slice(), ["outer", "inner"]);
	}

	#[test]
	fn current_scope_is_restored() {
		let scope = EffectScope::new();
		assert!(get_current_scope().is_none());
		scope.run(|| {
			assert!(get_current_scope().unwrap().ptr_eq(&scope));
		});
		assert!(get_current_scope().is_none());
	}
}
