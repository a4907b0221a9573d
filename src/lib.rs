pub mod macros;

mod collections;
mod computed;
mod config;
mod dep;
mod effect;
mod error;
mod graph;
mod handlers;
mod host;
mod key;
#[cfg(target_arch = "wasm32")]
mod microtask;
mod proxy;
mod reference;
mod runtime;
mod scheduler;
mod scope;
mod sequence;
mod target;
mod value;
mod watch;

pub use computed::{Computed, ComputedBody};
pub use config::{config, configure, Config, MAX_MARKER_BITS, RECURSION_LIMIT};
pub use dep::Dep;
pub use effect::{
	effect, effect_with, stop, track, trigger, DebuggerEvent, Effect, EffectOptions, Operation,
	Scheduler,
};
pub use error::{reset_error_handler, set_error_handler, ErrorCode, ReactiveError};
pub use graph::{detach, get_or_create_entry, resolve_subscribers, tracked_entries};
pub use host::{FlushHandle, Host, Task, TaskQueue};
#[cfg(target_arch = "wasm32")]
pub use host::Microtask;
pub use key::{ContainerKind, Key, Symbol, TargetId, TrackOp, TriggerOp, MAX_LENGTH};
pub use proxy::{
	is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly, shallow_reactive,
	shallow_readonly, to_raw, to_reactive, to_readonly, Flavor, Proxy,
};
pub use reference::{is_ref, to_ref, unref, Access, Ref};
pub use runtime::{enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked};
pub use scheduler::{
	flush_jobs, flush_post_flush_cbs, flush_pre_flush_cbs, invalidate_job, is_flushing, next_tick,
	queue_job, queue_post_flush_cb, queue_pre_flush_cb, queued_effect, run_pending_tasks, set_host,
	Job,
};
pub use scope::{get_current_scope, on_scope_dispose, EffectScope};
pub use target::{Fields, Shape, Target};
pub use value::Value;
pub use watch::{traverse, watch, watch_effect, Flush, WatchHandle, WatchOptions};
