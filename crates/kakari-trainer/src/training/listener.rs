//! # Listener Registry
//!
//! Listeners and single-event hooks share one registry ordered by
//! ascending priority. Entries with equal priority run in the order they
//! were added.

use kakari_core::DependencyParser;
use tracing::error;

use crate::error::Result;
use crate::training::event::{Event, EventContext};

/// Priority given to callbacks registered without one.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Receives every training event. All methods default to no-ops.
pub trait Listener<M: DependencyParser> {
    fn name(&self) -> &str {
        "listener"
    }

    fn on_train_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_train_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_batch_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_batch_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_train_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_validate_begin(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_validate_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }

    fn on_train_end(&mut self, _ctx: &mut EventContext<'_, M>) -> Result<()> {
        Ok(())
    }
}

/// Callback bound to a single event.
pub type Hook<M> = Box<dyn FnMut(&mut EventContext<'_, M>) -> Result<()>>;

enum Callback<M: DependencyParser> {
    Listener(Box<dyn Listener<M>>),
    Hook { event: Event, hook: Hook<M> },
}

impl<M: DependencyParser> Callback<M> {
    fn name(&self) -> &str {
        match self {
            Callback::Listener(listener) => listener.name(),
            Callback::Hook { event, .. } => event.name(),
        }
    }
}

struct Entry<M: DependencyParser> {
    priority: i32,
    callback: Callback<M>,
}

/// Priority-ordered listeners and hooks.
pub struct Registry<M: DependencyParser> {
    entries: Vec<Entry<M>>,
}

impl<M: DependencyParser> Registry<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener<M>>, priority: i32) {
        self.insert(priority, Callback::Listener(listener));
    }

    pub fn add_hook(&mut self, event: Event, priority: i32, hook: Hook<M>) {
        self.insert(priority, Callback::Hook { event, hook });
    }

    fn insert(&mut self, priority: i32, callback: Callback<M>) {
        // After every entry of lower or equal priority.
        let at = self.entries.partition_point(|e| e.priority <= priority);
        self.entries.insert(at, Entry { priority, callback });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Callback names in dispatch order; hooks are named after their event.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.callback.name()).collect()
    }

    /// Runs every callback interested in `ctx.event`, stopping at the
    /// first error.
    pub fn notify(&mut self, ctx: &mut EventContext<'_, M>) -> Result<()> {
        for entry in &mut self.entries {
            let outcome = match &mut entry.callback {
                Callback::Listener(listener) => dispatch(listener.as_mut(), ctx),
                Callback::Hook { event, hook } if *event == ctx.event => hook(ctx),
                Callback::Hook { .. } => continue,
            };
            if let Err(e) = outcome {
                error!(
                    callback = entry.callback.name(),
                    event = %ctx.event,
                    priority = entry.priority,
                    error = %e,
                    "callback failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<M: DependencyParser> Default for Registry<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch<M: DependencyParser>(
    listener: &mut dyn Listener<M>,
    ctx: &mut EventContext<'_, M>,
) -> Result<()> {
    match ctx.event {
        Event::TrainBegin => listener.on_train_begin(ctx),
        Event::EpochBegin => listener.on_epoch_begin(ctx),
        Event::EpochTrainBegin => listener.on_epoch_train_begin(ctx),
        Event::BatchBegin => listener.on_batch_begin(ctx),
        Event::BatchEnd => listener.on_batch_end(ctx),
        Event::EpochTrainEnd => listener.on_epoch_train_end(ctx),
        Event::EpochValidateBegin => listener.on_epoch_validate_begin(ctx),
        Event::EpochValidateEnd => listener.on_epoch_validate_end(ctx),
        Event::EpochEnd => listener.on_epoch_end(ctx),
        Event::TrainEnd => listener.on_train_end(ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use crate::training::event::Observation;
    use crate::training::testing::StubParser;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl Listener<StubParser> for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn on_batch_end(&mut self, _ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.log.borrow_mut().push(self.label.to_string());
            Ok(())
        }
    }

    fn hook(log: &Log, label: &'static str) -> Hook<StubParser> {
        let log = Rc::clone(log);
        Box::new(move |_ctx| {
            log.borrow_mut().push(label.to_string());
            Ok(())
        })
    }

    fn fire(registry: &mut Registry<StubParser>, event: Event) -> Result<()> {
        let model = StubParser::new();
        let mut observation = Observation::new();
        let mut ctx = EventContext::new(event, &model, &mut observation);
        registry.notify(&mut ctx)
    }

    #[test]
    fn ascending_priority_with_stable_ties() {
        let log: Log = Rc::default();
        let mut registry = Registry::new();
        registry.add_hook(Event::BatchEnd, DEFAULT_PRIORITY, hook(&log, "saver"));
        registry.add_listener(
            Box::new(Recorder { label: "evaluator", log: Rc::clone(&log) }),
            128,
        );
        registry.add_hook(Event::BatchEnd, 200, hook(&log, "progress"));
        registry.add_hook(Event::BatchEnd, 128, hook(&log, "second-128"));

        fire(&mut registry, Event::BatchEnd).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["evaluator", "second-128", "progress", "saver"]
        );
        assert_eq!(
            registry.names(),
            vec!["evaluator", "batch_end", "batch_end", "batch_end"]
        );
    }

    #[test]
    fn hooks_only_see_their_event() {
        let log: Log = Rc::default();
        let mut registry = Registry::new();
        registry.add_hook(Event::BatchEnd, DEFAULT_PRIORITY, hook(&log, "end"));
        registry.add_hook(Event::BatchBegin, DEFAULT_PRIORITY, hook(&log, "begin"));

        fire(&mut registry, Event::BatchBegin).unwrap();
        assert_eq!(*log.borrow(), vec!["begin"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn first_error_stops_dispatch() {
        let log: Log = Rc::default();
        let mut registry = Registry::new();
        registry.add_hook(
            Event::TrainEnd,
            1,
            Box::new(|_ctx| Err(TrainError::Checkpoint("disk full".into()))),
        );
        registry.add_hook(Event::TrainEnd, 2, hook(&log, "late"));

        assert!(fire(&mut registry, Event::TrainEnd).is_err());
        assert!(log.borrow().is_empty());
    }
}
