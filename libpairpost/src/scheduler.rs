//! Recurring daily scheduler
//!
//! Polls the wall clock every `poll_interval` and runs the coordinator when
//! a trigger time comes due. A run blocks the loop until it completes, so
//! triggers that pass in the meantime are logged as missed and wait for the
//! next day.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::content::ContentSource;
use crate::coordinator::{Coordinator, RunSummary};
use crate::error::Result;
use crate::schedule::{DailyTriggers, ScheduleEntry, ScheduleStore};
use crate::types::PostResult;
use crate::users::UserStore;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub struct Scheduler {
    store: ScheduleStore,
    triggers: DailyTriggers,
    coordinator: Coordinator,
    users: UserStore,
    content: Arc<dyn ContentSource>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: ScheduleStore,
        coordinator: Coordinator,
        users: UserStore,
        content: Arc<dyn ContentSource>,
        poll_interval: Duration,
    ) -> Self {
        Self::starting_at(store, coordinator, users, content, poll_interval, local_now())
    }

    /// Build a scheduler whose triggers are computed relative to `now`
    pub fn starting_at(
        store: ScheduleStore,
        coordinator: Coordinator,
        users: UserStore,
        content: Arc<dyn ContentSource>,
        poll_interval: Duration,
        now: NaiveDateTime,
    ) -> Self {
        let triggers = DailyTriggers::new(store.entries(), now);
        Self {
            store,
            triggers,
            coordinator,
            users,
            content,
            poll_interval,
        }
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.store.entries()
    }

    pub fn next_due(&self) -> Option<(ScheduleEntry, NaiveDateTime)> {
        self.triggers.next_due()
    }

    /// Add a trigger time, persisting it immediately
    ///
    /// The first occurrence is the next one strictly after `now`.
    pub fn add_time(&mut self, entry: ScheduleEntry, now: NaiveDateTime) -> Result<bool> {
        let added = self.store.add(entry)?;
        if added {
            self.triggers.add(entry, now);
        }
        Ok(added)
    }

    /// Remove a trigger time, persisting it immediately
    pub fn remove_time(&mut self, entry: ScheduleEntry) -> Result<bool> {
        let removed = self.store.remove(entry)?;
        if removed {
            self.triggers.remove(&entry);
        }
        Ok(removed)
    }

    /// Check triggers against `now`, running the coordinator once if any fired
    ///
    /// Reply capability is re-derived from the content source for every run.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Option<Vec<PostResult>> {
        let poll = self.triggers.poll(now);

        for entry in &poll.missed {
            warn!(time = %entry, "missed scheduled run, waiting for tomorrow");
        }

        if !poll.should_run() {
            return None;
        }

        let users = self.users.users(self.content.as_ref());
        let times: Vec<String> = poll.fired.iter().map(ToString::to_string).collect();
        info!(
            times = %times.join(", "),
            users = users.len(),
            with_replies = users.iter().filter(|u| u.has_reply_capability).count(),
            "scheduled run starting"
        );

        let started = Instant::now();
        let results = self.coordinator.run(&users).await;
        info!(summary = %RunSummary::from_results(&results), "scheduled run complete");

        let elapsed = chrono::Duration::from_std(started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        for entry in self.triggers.skip_through(now + elapsed) {
            warn!(time = %entry, "scheduled time passed during the run, waiting for tomorrow");
        }

        if let Some((entry, due)) = self.triggers.next_due() {
            info!(time = %entry, at = %due, "next run");
        }

        Some(results)
    }

    /// Tick until `shutdown` is set
    ///
    /// The flag is checked between ticks; a run in progress always completes.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(
            entries = self.store.entries().len(),
            users = self.users.len(),
            poll_interval = ?self.poll_interval,
            "scheduler started"
        );
        match self.triggers.next_due() {
            Some((entry, due)) => info!(time = %entry, at = %due, "next run"),
            None => warn!("no schedule times configured, nothing will run"),
        }

        while !shutdown.load(Ordering::SeqCst) {
            self.tick(local_now()).await;
            sleep(self.poll_interval).await;
        }

        info!("scheduler stopped");
    }
}
