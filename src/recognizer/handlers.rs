//! Handler table
//!
//! Binding a handler does two things: it stores the callback and it adds the
//! kind to the subscription set. The subscription set is what `connect`
//! advertises as solvables, so a kind with no handler is never requested from
//! the service.

use std::collections::BTreeSet;
use tracing::debug;

use super::events::{
    C2SimSymbolReport, EventKind, InkProcessed, Notification, RoleSwitched, SpeechRecognized,
    StpMessage, SymbolAdded, SymbolDeleted, SymbolModified, TaskAdded, TaskDeleted, TaskModified,
    TaskOrgAdded, TaskOrgDeleted, TaskOrgModified, TaskOrgSwitched,
};

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Callbacks for inbound notifications, built before connecting.
///
/// ```ignore
/// let handlers = Handlers::new()
///     .on_symbol_added(|added| println!("{} alternates", added.alternates.len()))
///     .on_stp_message(|msg| eprintln!("{:?}: {}", msg.level, msg.message));
/// ```
#[derive(Default)]
pub struct Handlers {
    subscribed: BTreeSet<EventKind>,
    symbol_added: Option<Callback<SymbolAdded>>,
    symbol_modified: Option<Callback<SymbolModified>>,
    symbol_deleted: Option<Callback<SymbolDeleted>>,
    ink_processed: Option<Callback<InkProcessed>>,
    speech_recognized: Option<Callback<SpeechRecognized>>,
    stp_message: Option<Callback<StpMessage>>,
    role_switched: Option<Callback<RoleSwitched>>,
    task_org_added: Option<Callback<TaskOrgAdded>>,
    task_org_modified: Option<Callback<TaskOrgModified>>,
    task_org_deleted: Option<Callback<TaskOrgDeleted>>,
    task_org_switched: Option<Callback<TaskOrgSwitched>>,
    task_added: Option<Callback<TaskAdded>>,
    task_modified: Option<Callback<TaskModified>>,
    task_deleted: Option<Callback<TaskDeleted>>,
    c2sim_symbol_report: Option<Callback<C2SimSymbolReport>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_symbol_added(mut self, f: impl Fn(SymbolAdded) + Send + Sync + 'static) -> Self {
        self.symbol_added = Some(Box::new(f));
        self.subscribed.insert(EventKind::SymbolAdded);
        self
    }

    pub fn on_symbol_modified(mut self, f: impl Fn(SymbolModified) + Send + Sync + 'static) -> Self {
        self.symbol_modified = Some(Box::new(f));
        self.subscribed.insert(EventKind::SymbolModified);
        self
    }

    pub fn on_symbol_deleted(mut self, f: impl Fn(SymbolDeleted) + Send + Sync + 'static) -> Self {
        self.symbol_deleted = Some(Box::new(f));
        self.subscribed.insert(EventKind::SymbolDeleted);
        self
    }

    pub fn on_ink_processed(mut self, f: impl Fn(InkProcessed) + Send + Sync + 'static) -> Self {
        self.ink_processed = Some(Box::new(f));
        self.subscribed.insert(EventKind::InkProcessed);
        self
    }

    pub fn on_speech_recognized(
        mut self,
        f: impl Fn(SpeechRecognized) + Send + Sync + 'static,
    ) -> Self {
        self.speech_recognized = Some(Box::new(f));
        self.subscribed.insert(EventKind::SpeechRecognized);
        self
    }

    /// Also receives client-side errors (connection loss, failed sends).
    pub fn on_stp_message(mut self, f: impl Fn(StpMessage) + Send + Sync + 'static) -> Self {
        self.stp_message = Some(Box::new(f));
        self.subscribed.insert(EventKind::StpMessage);
        self
    }

    pub fn on_role_switched(mut self, f: impl Fn(RoleSwitched) + Send + Sync + 'static) -> Self {
        self.role_switched = Some(Box::new(f));
        self.subscribed.insert(EventKind::RoleSwitched);
        self
    }

    pub fn on_task_org_added(mut self, f: impl Fn(TaskOrgAdded) + Send + Sync + 'static) -> Self {
        self.task_org_added = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskOrgAdded);
        self
    }

    pub fn on_task_org_modified(
        mut self,
        f: impl Fn(TaskOrgModified) + Send + Sync + 'static,
    ) -> Self {
        self.task_org_modified = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskOrgModified);
        self
    }

    pub fn on_task_org_deleted(
        mut self,
        f: impl Fn(TaskOrgDeleted) + Send + Sync + 'static,
    ) -> Self {
        self.task_org_deleted = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskOrgDeleted);
        self
    }

    pub fn on_task_org_switched(
        mut self,
        f: impl Fn(TaskOrgSwitched) + Send + Sync + 'static,
    ) -> Self {
        self.task_org_switched = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskOrgSwitched);
        self
    }

    pub fn on_task_added(mut self, f: impl Fn(TaskAdded) + Send + Sync + 'static) -> Self {
        self.task_added = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskAdded);
        self
    }

    pub fn on_task_modified(mut self, f: impl Fn(TaskModified) + Send + Sync + 'static) -> Self {
        self.task_modified = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskModified);
        self
    }

    pub fn on_task_deleted(mut self, f: impl Fn(TaskDeleted) + Send + Sync + 'static) -> Self {
        self.task_deleted = Some(Box::new(f));
        self.subscribed.insert(EventKind::TaskDeleted);
        self
    }

    pub fn on_c2sim_symbol_report(
        mut self,
        f: impl Fn(C2SimSymbolReport) + Send + Sync + 'static,
    ) -> Self {
        self.c2sim_symbol_report = Some(Box::new(f));
        self.subscribed.insert(EventKind::C2SimSymbolReport);
        self
    }

    pub fn subscribes_to(&self, kind: EventKind) -> bool {
        self.subscribed.contains(&kind)
    }

    /// Wire names of the subscribed kinds, sent as `solvables` in Register.
    pub fn solvables(&self) -> Vec<String> {
        self.subscribed
            .iter()
            .map(|kind| kind.method().to_string())
            .collect()
    }

    /// Hand a notification to its handler. Returns false when none is bound.
    pub fn dispatch(&self, notification: Notification) -> bool {
        match notification {
            Notification::SymbolAdded(ev) => call(&self.symbol_added, ev),
            Notification::SymbolModified(ev) => call(&self.symbol_modified, ev),
            Notification::SymbolDeleted(ev) => call(&self.symbol_deleted, ev),
            Notification::InkProcessed(ev) => call(&self.ink_processed, ev),
            Notification::SpeechRecognized(ev) => call(&self.speech_recognized, ev),
            Notification::StpMessage(ev) => call(&self.stp_message, ev),
            Notification::RoleSwitched(ev) => call(&self.role_switched, ev),
            Notification::TaskOrgAdded(ev) => call(&self.task_org_added, ev),
            Notification::TaskOrgModified(ev) => call(&self.task_org_modified, ev),
            Notification::TaskOrgDeleted(ev) => call(&self.task_org_deleted, ev),
            Notification::TaskOrgSwitched(ev) => call(&self.task_org_switched, ev),
            Notification::TaskAdded(ev) => call(&self.task_added, ev),
            Notification::TaskModified(ev) => call(&self.task_modified, ev),
            Notification::TaskDeleted(ev) => call(&self.task_deleted, ev),
            Notification::C2SimSymbolReport(ev) => call(&self.c2sim_symbol_report, ev),
            Notification::Unrecognized { method, .. } => {
                debug!(method = %method, "No handler slot for method");
                false
            }
        }
    }
}

fn call<T>(slot: &Option<Callback<T>>, event: T) -> bool {
    match slot {
        Some(callback) => {
            callback(event);
            true
        }
        None => false,
    }
}
