use crate::models::{Device, DeviceId, MetricSample, Timeframe};
use crate::tokens::{RefreshTarget, RequestToken, RequestTokens};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

/// Change notifications published by the store to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    DevicesReplaced,
    SelectionChanged(Option<DeviceId>),
    MetricsReplaced(DeviceId),
    TimeframeChanged(Timeframe),
    RefreshRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A message the user has to acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Read-only copy of the store handed to the renderer each frame.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub devices: Vec<Device>,
    pub selected: Option<DeviceId>,
    pub metrics: Vec<MetricSample>,
    pub timeframe: Timeframe,
    pub poll_state: PollState,
    pub action_busy: bool,
    pub notice: Option<Notice>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl StoreSnapshot {
    pub fn selected_device(&self) -> Option<&Device> {
        let id = self.selected?;
        self.devices.iter().find(|d| d.id == id)
    }
}

#[derive(Default)]
struct StoreState {
    devices: Vec<Device>,
    selected: Option<DeviceId>,
    metrics: Vec<MetricSample>,
    timeframe: Timeframe,
    poll_state: PollState,
    action_busy: bool,
    notices: VecDeque<Notice>,
    last_refreshed: Option<DateTime<Utc>>,
    closed: bool,
}

/// Shared handle over the dashboard state: the device list, the current
/// selection and that selection's metric history.
///
/// Every replacement is all-or-nothing. Refresh results carry a
/// [`RequestToken`] and are dropped unless the token is still the newest one
/// issued for its target.
#[derive(Clone)]
pub struct DeviceStore {
    state: Arc<Mutex<StoreState>>,
    tokens: Arc<RequestTokens>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::with_timeframe(Timeframe::default())
    }

    pub fn with_timeframe(timeframe: Timeframe) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(StoreState {
                timeframe,
                ..Default::default()
            })),
            tokens: Arc::new(RequestTokens::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<StoreEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot {
            devices: state.devices.clone(),
            selected: state.selected,
            metrics: state.metrics.clone(),
            timeframe: state.timeframe,
            poll_state: state.poll_state,
            action_busy: state.action_busy,
            notice: state.notices.front().cloned(),
            last_refreshed: state.last_refreshed,
        }
    }

    pub fn selected_id(&self) -> Option<DeviceId> {
        self.lock().selected
    }

    pub fn timeframe(&self) -> Timeframe {
        self.lock().timeframe
    }

    /// Issues a fresh token for `target`. Returns `None` once the store is
    /// closed, or for metrics of a device that is not selected.
    pub fn begin_refresh(&self, target: RefreshTarget) -> Option<RequestToken> {
        let state = self.lock();
        if state.closed {
            return None;
        }
        if let RefreshTarget::Metrics(id) = target {
            if state.selected != Some(id) {
                return None;
            }
        }
        Some(self.tokens.issue(target))
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        !self.lock().closed && self.tokens.is_current(token)
    }

    /// Unconditional replace of the device list. Any refresh still in flight
    /// for the list becomes stale.
    pub fn replace_devices(&self, devices: Vec<Device>) {
        let events = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            self.tokens.invalidate(RefreshTarget::DeviceList);
            self.install_devices(&mut state, devices)
        };
        self.emit(events);
    }

    /// Replaces the device list if `token` is still the newest list refresh.
    pub fn apply_devices(&self, token: &RequestToken, devices: Vec<Device>) -> bool {
        let events = {
            let mut state = self.lock();
            if state.closed || token.target != RefreshTarget::DeviceList {
                return false;
            }
            if !self.tokens.is_current(token) {
                warn!(seq = token.seq, "discarding stale device list response");
                return false;
            }
            self.install_devices(&mut state, devices)
        };
        self.emit(events);
        true
    }

    fn install_devices(&self, state: &mut StoreState, devices: Vec<Device>) -> Vec<StoreEvent> {
        let mut events = vec![StoreEvent::DevicesReplaced];
        if let Some(selected) = state.selected {
            if !devices.iter().any(|d| d.id == selected) {
                debug!(device_id = selected, "selected device disappeared, clearing selection");
                state.selected = None;
                state.metrics.clear();
                self.tokens.invalidate(RefreshTarget::Metrics(selected));
                events.push(StoreEvent::SelectionChanged(None));
            }
        }
        debug!(count = devices.len(), "device list replaced");
        state.devices = devices;
        state.last_refreshed = Some(Utc::now());
        events
    }

    /// Selects a device by id, which asks subscribers to load its metrics.
    /// Ids not in the current list are ignored.
    pub fn select(&self, id: DeviceId) -> bool {
        {
            let mut state = self.lock();
            if state.closed || !state.devices.iter().any(|d| d.id == id) {
                return false;
            }
            if let Some(previous) = state.selected.filter(|prev| *prev != id) {
                state.metrics.clear();
                self.tokens.invalidate(RefreshTarget::Metrics(previous));
            }
            state.selected = Some(id);
        }
        self.emit(vec![StoreEvent::SelectionChanged(Some(id))]);
        true
    }

    pub fn clear_selection(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let Some(previous) = state.selected.take() else {
                return;
            };
            state.metrics.clear();
            self.tokens.invalidate(RefreshTarget::Metrics(previous));
        }
        self.emit(vec![StoreEvent::SelectionChanged(None)]);
    }

    /// Replaces the metric history, but only for the device currently selected.
    pub fn replace_metrics(&self, device_id: DeviceId, samples: Vec<MetricSample>) -> bool {
        {
            let mut state = self.lock();
            if state.closed || state.selected != Some(device_id) {
                return false;
            }
            self.tokens.invalidate(RefreshTarget::Metrics(device_id));
            state.metrics = samples;
        }
        self.emit(vec![StoreEvent::MetricsReplaced(device_id)]);
        true
    }

    pub fn apply_metrics(&self, token: &RequestToken, samples: Vec<MetricSample>) -> bool {
        let RefreshTarget::Metrics(device_id) = token.target else {
            return false;
        };
        {
            let mut state = self.lock();
            if state.closed || state.selected != Some(device_id) {
                return false;
            }
            if !self.tokens.is_current(token) {
                warn!(device_id, seq = token.seq, "discarding stale metrics response");
                return false;
            }
            debug!(device_id, count = samples.len(), "metrics replaced");
            state.metrics = samples;
        }
        self.emit(vec![StoreEvent::MetricsReplaced(device_id)]);
        true
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        {
            let mut state = self.lock();
            if state.closed || state.timeframe == timeframe {
                return;
            }
            state.timeframe = timeframe;
            state.metrics.clear();
            if let Some(id) = state.selected {
                self.tokens.invalidate(RefreshTarget::Metrics(id));
            }
        }
        self.emit(vec![StoreEvent::TimeframeChanged(timeframe)]);
    }

    /// Asks the scheduler for an immediate device list refresh.
    pub fn request_refresh(&self) {
        if self.lock().closed {
            return;
        }
        self.emit(vec![StoreEvent::RefreshRequested]);
    }

    pub fn set_poll_state(&self, poll_state: PollState) {
        self.lock().poll_state = poll_state;
    }

    /// Marks a user action as running. Returns false if one already is.
    pub fn try_begin_action(&self) -> bool {
        let mut state = self.lock();
        if state.closed || state.action_busy {
            return false;
        }
        state.action_busy = true;
        true
    }

    pub fn end_action(&self) {
        self.lock().action_busy = false;
    }

    pub fn push_notice(&self, notice: Notice) {
        let mut state = self.lock();
        if !state.closed {
            state.notices.push_back(notice);
        }
    }

    pub fn dismiss_notice(&self) -> Option<Notice> {
        self.lock().notices.pop_front()
    }

    /// Tears the store down: later refreshes and events are dropped.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.poll_state = PollState::Idle;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
