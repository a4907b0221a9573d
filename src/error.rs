use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::Key;

/// Where user code was running when it panicked.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorCode {
	Scheduler,
	PreFlushCallback,
	PostFlushCallback,
	WatchGetter,
	WatchCallback,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ErrorCode::Scheduler => "scheduler flush",
			ErrorCode::PreFlushCallback => "pre-flush callback",
			ErrorCode::PostFlushCallback => "post-flush callback",
			ErrorCode::WatchGetter => "watcher getter",
			ErrorCode::WatchCallback => "watcher callback",
		})
	}
}

/// Every condition the engine reports. None of them unwinds: they are
/// handed to the installed error handler and the engine carries on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
	#[error("set operation on key {key:?} failed: target is readonly")]
	ReadonlyWrite { key: Key },

	#[error("delete operation on key {key:?} failed: target is readonly")]
	ReadonlyDelete { key: Key },

	#[error("{operation} operation failed: target is readonly")]
	ReadonlyMutation { operation: &'static str },

	#[error("write operation failed: computed value is readonly")]
	ReadonlyComputed,

	#[error("value cannot be made reactive: {0}")]
	NotAnObject(String),

	#[error("maximum recursive updates exceeded ({limit}): a job keeps scheduling itself")]
	RecursionLimit { limit: u32 },

	#[error("unhandled panic in {code}: {message}")]
	UserPanic { code: ErrorCode, message: String },
}

impl ReactiveError {
	pub fn is_misuse(&self) -> bool {
		!matches!(
			self,
			ReactiveError::RecursionLimit { .. } | ReactiveError::UserPanic { .. }
		)
	}
}

type Handler = Rc<dyn Fn(&ReactiveError)>;

thread_local! {
	static HANDLER: RefCell<Option<Handler>> = RefCell::new(None);
}

/// Route diagnostics to `handler` instead of `tracing`.
pub fn set_error_handler(handler: impl Fn(&ReactiveError) + 'static) {
	HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

pub fn reset_error_handler() {
	HANDLER.with(|h| *h.borrow_mut() = None);
}

pub(crate) fn report(error: ReactiveError) {
	let handler = HANDLER.with(|h| h.borrow().clone());
	match handler {
		Some(handler) => handler(&error),
		None => match error {
			ReactiveError::UserPanic { .. } => tracing::error!(%error),
			_ => tracing::warn!(%error),
		},
	}
}

/// Run user code, turning a panic into a reported `UserPanic`.
/// Returns `false` when `func` panicked.
pub(crate) fn call_with_error_handling(code: ErrorCode, func: impl FnOnce()) -> bool {
	match catch_unwind(AssertUnwindSafe(func)) {
		Ok(()) => true,
		Err(payload) => {
			report(ReactiveError::UserPanic {
				code,
				message: panic_message(&payload),
			});
			false
		}
	}
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"<non-string panic payload>".to_string()
	}
}
