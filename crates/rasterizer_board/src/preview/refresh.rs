use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Period of the live-preview refresh.
    pub interval: Duration,
    /// Quiet time after an edit before the post-edit refresh runs.
    pub debounce: Duration,
    pub live: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            debounce: Duration::from_millis(100),
            live: true,
        }
    }
}

/// Identifies one dispatched refresh. Only the newest ticket may publish its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// Decides when the preview is recomputed: on a fixed period while live preview is on, and
/// once per burst of edits after the debounce window closes.
///
/// The scheduler never reads the clock itself; callers feed it the time of each event.
#[derive(Debug)]
pub struct RefreshScheduler {
    options: RefreshOptions,
    last_run: Option<Instant>,
    pending: Option<Instant>,
    generation: u64,
    in_flight: Option<u64>,
}

impl RefreshScheduler {
    pub fn new(options: RefreshOptions) -> Self {
        Self { options, last_run: None, pending: None, generation: 0, in_flight: None }
    }

    pub fn is_live(&self) -> bool {
        self.options.live
    }

    /// Turning live preview on makes the periodic refresh due immediately; turning it off
    /// stops the timer but keeps a pending post-edit refresh.
    pub fn set_live(&mut self, live: bool) {
        if live && !self.options.live {
            self.last_run = None;
        }
        self.options.live = live;
    }

    /// Starts (or restarts) the debounce window.
    pub fn notify_edit(&mut self, now: Instant) {
        self.pending = Some(now + self.options.debounce);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Returns a ticket when a refresh is due at `now`. Dispatching supersedes any refresh
    /// still in flight.
    pub fn poll(&mut self, now: Instant) -> Option<RefreshTicket> {
        let edit_due = self.pending.is_some_and(|deadline| now >= deadline);
        let interval_due = self.options.live
            && self.last_run.map_or(true, |last| now.duration_since(last) >= self.options.interval);

        if !edit_due && !interval_due {
            return None;
        }

        if edit_due {
            self.pending = None;
        }
        Some(self.dispatch(now))
    }

    /// Forces a refresh regardless of timers, e.g. after loading a snapshot.
    pub fn dispatch(&mut self, now: Instant) -> RefreshTicket {
        self.generation += 1;
        self.last_run = Some(now);
        self.in_flight = Some(self.generation);
        RefreshTicket(self.generation)
    }

    /// Accepts the result of `ticket` only if no newer refresh was dispatched since.
    pub fn complete(&mut self, ticket: RefreshTicket) -> bool {
        if self.in_flight != Some(ticket.0) {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Earliest instant at which [`Self::poll`] will fire, for event loops that sleep.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let periodic = match (self.options.live, self.last_run) {
            (false, _) => None,
            (true, None) => Some(now),
            (true, Some(last)) => Some(last + self.options.interval),
        };

        match (periodic, self.pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Stops all timers and invalidates any refresh still in flight.
    pub fn shutdown(&mut self) {
        self.options.live = false;
        self.pending = None;
        self.in_flight = None;
        self.generation += 1;
    }
}
