//! The scheduler: a single event loop owning the document session.
//!
//! Owns the three timers (debounce-on-edit, auto-save interval, sync-poll
//! interval) and the teardown flush. All session mutation happens on this
//! loop, one event at a time, so the state tuple is never observed in a
//! torn state.

use crate::config::SchedulerConfig;
use scratchpad_core::events::{EventBus, StatusEvent, now_millis};
use scratchpad_core::probe::probe_area;
use scratchpad_core::session::Session;
use scratchpad_core::storage::{ChangeNotification, StorageBackend};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, sleep, sleep_until};
use tracing::{debug, info, warn};

/// Commands a host can send to a running scratchpad.
#[derive(Debug)]
enum Command {
    /// User-initiated refresh of the stored value.
    Refresh,
    /// Stop the loop after a final flush.
    Shutdown,
}

/// Host-side handle to a running scratchpad.
///
/// Dropping the handle closes the input channels, which the loop treats
/// the same as an explicit shutdown.
#[derive(Clone)]
pub struct ScratchpadHandle {
    edit_tx: mpsc::UnboundedSender<String>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl ScratchpadHandle {
    /// Report a local edit: the full replacement content of the note.
    pub fn edit(&self, content: impl Into<String>) {
        let _ = self.edit_tx.send(content.into());
    }

    /// Trigger a manual refresh cycle.
    pub fn refresh(&self) {
        let _ = self.command_tx.send(Command::Refresh);
    }

    /// Request teardown: timers stop and pending state is flushed.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

/// One open scratchpad view: session plus the scheduler's input channels.
pub struct Scratchpad<S: StorageBackend> {
    session: Session<S>,
    config: SchedulerConfig,
    edit_rx: mpsc::UnboundedReceiver<String>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    change_rx: mpsc::UnboundedReceiver<ChangeNotification>,
}

impl<S: StorageBackend> Scratchpad<S> {
    /// Probe the storage area, load the note, and set up the loop.
    ///
    /// A failed initial load is surfaced as a status event and the
    /// session starts from the empty document; the next scheduled cycle
    /// retries against the backend.
    pub async fn open(
        storage: S,
        config: SchedulerConfig,
        events: Arc<EventBus>,
    ) -> (Self, ScratchpadHandle) {
        let area = probe_area(&storage).await;
        events.emit(StatusEvent::AreaSelected {
            area,
            timestamp: now_millis(),
        });

        // Subscribe before the first load so no notification is missed.
        let change_rx = storage.subscribe();

        let mut session = Session::new(storage, area, events);
        if session.load().await.is_err() {
            warn!("initial load failed, starting from empty document");
        }

        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        info!(area = area.label(), "scratchpad opened");

        (
            Self {
                session,
                config,
                edit_rx,
                command_rx,
                change_rx,
            },
            ScratchpadHandle { edit_tx, command_tx },
        )
    }

    /// Borrow the underlying session (pre-run inspection).
    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    /// Run the event loop until shutdown, then flush.
    pub async fn run(mut self) {
        let start = Instant::now();
        let mut autosave = interval_at(start + self.config.autosave_interval, self.config.autosave_interval);
        let mut poll = interval_at(start + self.config.poll_interval, self.config.poll_interval);
        autosave.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Trailing-edge debounce: armed on every edit, cancelled by re-arming.
        let mut debounce_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                maybe_edit = self.edit_rx.recv() => match maybe_edit {
                    Some(content) => {
                        self.session.on_edit(content);
                        debounce_deadline = Some(Instant::now() + self.config.debounce);
                    }
                    // Host dropped the handle: tear down.
                    None => break,
                },

                maybe_command = self.command_rx.recv() => match maybe_command {
                    Some(Command::Refresh) => self.manual_refresh().await,
                    Some(Command::Shutdown) | None => break,
                },

                // Debounce timer fires after a quiet period.
                _ = wait_for(debounce_deadline) => {
                    debounce_deadline = None;
                    // Errors are surfaced as status events; the next
                    // cycle re-attempts the write.
                    let _ = self.session.save().await;
                },

                _ = autosave.tick() => {
                    if self.session.needs_save() {
                        debug!("auto-save tick");
                        let _ = self.session.save().await;
                    }
                },

                _ = poll.tick() => {
                    let _ = self.session.check_remote().await;
                },

                Some(notification) = self.change_rx.recv() => {
                    if let Ok(Some(outcome)) = self.session.handle_notification(&notification).await {
                        debug!(?outcome, "change notification arbitrated");
                    }
                },
            }
        }

        // Apply edits still queued so the flush captures them.
        while let Ok(content) = self.edit_rx.try_recv() {
            self.session.on_edit(content);
        }

        // Timers are dropped here; best-effort final flush.
        if self.session.needs_save() {
            debug!("flushing pending edit on teardown");
            let _ = self.session.save().await;
        }
        info!("scratchpad closed");
    }

    /// Manual refresh: same read-then-arbitrate as the poll path, with a
    /// minimum visual feedback window bracketed by refresh events so the
    /// host can disable its refresh control.
    async fn manual_refresh(&mut self) {
        let started = Instant::now();
        self.session.events().emit(StatusEvent::RefreshStarted {
            timestamp: now_millis(),
        });

        let _ = self.session.check_remote().await;

        let elapsed = started.elapsed();
        if elapsed < self.config.refresh_feedback {
            sleep(self.config.refresh_feedback - elapsed).await;
        }
        self.session.events().emit(StatusEvent::RefreshFinished {
            timestamp: now_millis(),
        });
    }
}

/// Resolve at `deadline`, or never when the debounce timer is unarmed.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
