use futures::{Stream, StreamExt};
use hass_entity_state::StateChanged;
use std::{fmt, future::Future, time::Duration};
use tokio::{
	select,
	sync::oneshot,
	task::JoinHandle,
	time::{self, Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug_span, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
	Interval,
	StateChange,
	Manual,
}

impl TriggerKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerKind::Interval => "interval",
			TriggerKind::StateChange => "state_change",
			TriggerKind::Manual => "manual",
		}
	}
}

impl fmt::Display for TriggerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Owns a spawned trigger task.
///
/// The task runs until [`TriggerHandle::cancel`] is called or the handle is
/// dropped. Cancelling never aborts work the trigger already fired.
pub struct TriggerHandle {
	name: &'static str,
	lifetime: Option<oneshot::Sender<()>>,
	task: Option<JoinHandle<()>>,
}

impl fmt::Debug for TriggerHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TriggerHandle")
			.field("name", &self.name)
			.field("cancelled", &self.is_cancelled())
			.finish()
	}
}

impl TriggerHandle {
	fn spawn<F, Fut>(name: &'static str, run: F) -> Self
	where
		F: FnOnce(oneshot::Receiver<()>) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (lifetime, cancelled) = oneshot::channel();
		let task = tokio::spawn(run(cancelled).instrument(debug_span!("trigger", name)));

		TriggerHandle {
			name,
			lifetime: Some(lifetime),
			task: Some(task),
		}
	}

	#[inline]
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Returns `false` if the trigger was already cancelled.
	pub fn cancel(&mut self) -> bool {
		// Dropping the sender wakes the task.
		self.lifetime.take().is_some()
	}

	pub fn is_cancelled(&self) -> bool {
		self.lifetime.is_none()
	}

	pub fn is_finished(&self) -> bool {
		self.task.as_ref().is_none_or(JoinHandle::is_finished)
	}

	/// Cancels the trigger and waits for its task to exit.
	pub async fn stop(mut self) {
		self.cancel();
		if let Some(task) = self.task.take() {
			let _ = task.await;
		}
	}
}

/// Calls `fire` every `period`, starting one period from now. Ticks missed
/// while the runtime was busy are delayed, not bunched up.
pub fn spawn_interval<F>(period: Duration, mut fire: F) -> TriggerHandle
where
	F: FnMut() + Send + 'static,
{
	TriggerHandle::spawn("interval", move |mut cancelled| async move {
		let Some(start) = Instant::now().checked_add(period) else {
			warn!(?period, "interval is out of range, never firing");
			let _ = cancelled.await;
			return;
		};

		let mut ticks = time::interval_at(start, period);
		ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			select! {
				biased;
				_ = &mut cancelled => break,
				_ = ticks.tick() => {
					trace!("interval elapsed");
					fire();
				}
			}
		}
	})
}

/// Calls `fire` for every event of `changes` until the stream ends.
pub fn spawn_state_listener<S, F>(mut changes: S, mut fire: F) -> TriggerHandle
where
	S: Stream<Item = StateChanged> + Send + Unpin + 'static,
	F: FnMut(StateChanged) + Send + 'static,
{
	TriggerHandle::spawn("state_listener", move |mut cancelled| async move {
		loop {
			select! {
				biased;
				_ = &mut cancelled => break,
				change = changes.next() => match change {
					Some(change) => {
						trace!(entity_id = %change.entity_id, "state changed");
						fire(change);
					}
					None => break,
				},
			}
		}
	})
}

/// Runs `hook` once when `shutdown` resolves, unless cancelled first.
pub fn spawn_shutdown_hook<S, F, Fut>(shutdown: S, hook: F) -> TriggerHandle
where
	S: Future<Output = ()> + Send + 'static,
	F: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	TriggerHandle::spawn("shutdown_hook", move |mut cancelled| async move {
		select! {
			biased;
			_ = &mut cancelled => {}
			_ = shutdown => {
				trace!("host stopped");
				hook().await;
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		host::Host,
		memory::MemoryHost,
		testing::{johns_phone, johns_phone_at},
	};
	use std::sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	};

	fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
		let count = Arc::new(AtomicUsize::new(0));
		let fire = {
			let count = count.clone();
			move || {
				count.fetch_add(1, Ordering::SeqCst);
			}
		};

		(count, fire)
	}

	#[tokio::test(start_paused = true)]
	async fn interval_fires_after_each_period() {
		let (count, fire) = counter();
		let handle = spawn_interval(Duration::from_secs(30), fire);

		time::sleep(Duration::from_secs(29)).await;
		assert_eq!(count.load(Ordering::SeqCst), 0);

		time::sleep(Duration::from_secs(66)).await;
		assert_eq!(count.load(Ordering::SeqCst), 3);

		handle.stop().await;
		time::sleep(Duration::from_secs(300)).await;
		assert_eq!(count.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn out_of_range_interval_never_fires() {
		let (count, fire) = counter();
		let handle = spawn_interval(Duration::MAX, fire);

		time::sleep(Duration::from_secs(300)).await;
		assert_eq!(count.load(Ordering::SeqCst), 0);
		assert!(!handle.is_finished());

		handle.stop().await;
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_handle_cancels() {
		let (count, fire) = counter();
		let handle = spawn_interval(Duration::from_secs(30), fire);
		drop(handle);

		time::sleep(Duration::from_secs(300)).await;
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn cancel_is_idempotent() {
		let (_, fire) = counter();
		let mut handle = spawn_interval(Duration::from_secs(30), fire);

		assert!(handle.cancel());
		assert!(!handle.cancel());
		assert!(handle.is_cancelled());
		handle.stop().await;
	}

	#[tokio::test]
	async fn state_listener_fires_per_change() {
		let host = MemoryHost::new();
		let count = Arc::new(AtomicUsize::new(0));
		let handle = spawn_state_listener(host.state_changes(&johns_phone()), {
			let count = count.clone();
			move |_| {
				count.fetch_add(1, Ordering::SeqCst);
			}
		});

		host.set_state(johns_phone_at(52.1, 4.3));
		host.set_state(johns_phone_at(52.2, 4.3));

		// Ending the stream ends the task after the queued events.
		host.stop();
		while !handle.is_finished() {
			tokio::task::yield_now().await;
		}

		assert_eq!(count.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn shutdown_hook_runs_once_host_stops() {
		let host = MemoryHost::new();
		let (count, mut fire) = counter();
		let handle = spawn_shutdown_hook(host.shutdown(), move || {
			fire();
			async {}
		});

		host.stop();
		while !handle.is_finished() {
			tokio::task::yield_now().await;
		}

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn cancelled_shutdown_hook_never_runs() {
		let host = MemoryHost::new();
		let (count, mut fire) = counter();
		let handle = spawn_shutdown_hook(host.shutdown(), move || {
			fire();
			async {}
		});

		handle.stop().await;
		host.stop();
		tokio::task::yield_now().await;
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}
}
