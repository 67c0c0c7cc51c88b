//! # Trainer
//!
//! Runs epochs of mini-batch training with optional validation, notifying
//! the registry at every [`Event`]. The trainer owns the model and the
//! optimizer; listeners see the model through [`EventContext::model`].

use candle_core::Var;
use candle_nn::Optimizer;
use kakari_core::data::{Batch, Dataset};
use kakari_core::model::scalar;
use kakari_core::DependencyParser;
use oorandom::Rand32;
use tracing::{error, info, info_span, Span};

use crate::error::Result;
use crate::training::event::{Event, EventContext, Observation};
use crate::training::hooks::{OptimizerHook, UpdateContext};
use crate::training::listener::{Hook, Listener, Registry};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    epoch: usize,
    n_epoch: usize,
    train: bool,
    size: usize,
}

impl Cursor {
    fn context<'a, M: DependencyParser>(
        self,
        event: Event,
        model: &'a M,
        observation: &'a mut Observation,
    ) -> EventContext<'a, M> {
        let mut ctx = EventContext::new(event, model, observation);
        ctx.epoch = self.epoch;
        ctx.n_epoch = self.n_epoch;
        ctx.train = self.train;
        ctx.size = self.size;
        ctx
    }
}

pub struct Trainer<M: DependencyParser, O: Optimizer> {
    model: M,
    optimizer: O,
    registry: Registry<M>,
    optimizer_hooks: Vec<Box<dyn OptimizerHook>>,
    rng: Option<Rand32>,
    steps: u64,
    span: Span,
}

impl<M: DependencyParser, O: Optimizer> Trainer<M, O> {
    pub fn new(model: M, optimizer: O) -> Self {
        Self {
            model,
            optimizer,
            registry: Registry::new(),
            optimizer_hooks: Vec::new(),
            rng: None,
            steps: 0,
            span: info_span!("trainer"),
        }
    }

    /// Shuffles the order of training batches every epoch.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.rng = Some(Rand32::new(seed));
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener<M>>, priority: i32) {
        self.registry.add_listener(listener, priority);
    }

    pub fn add_hook(&mut self, event: Event, priority: i32, hook: Hook<M>) {
        self.registry.add_hook(event, priority, hook);
    }

    /// Hooks run in the order they were added.
    pub fn add_optimizer_hook(&mut self, hook: Box<dyn OptimizerHook>) {
        self.optimizer_hooks.push(hook);
    }

    pub fn optimizer_hook_names(&self) -> Vec<&str> {
        self.optimizer_hooks.iter().map(|hook| hook.name()).collect()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Parameter updates applied so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Trains for `n_epoch` epochs over `train` in batches of at most
    /// `batch_size` tokens, validating on `valid` after each epoch.
    pub fn fit(
        &mut self,
        train: &Dataset,
        valid: Option<&Dataset>,
        n_epoch: usize,
        batch_size: usize,
    ) -> Result<()> {
        let _guard = self.span.clone().entered();
        let Self {
            model,
            optimizer,
            registry,
            optimizer_hooks,
            rng,
            steps,
            ..
        } = self;
        let model = &*model;
        let vars = model.trainable_vars();
        let mut observation = Observation::new();

        info!(
            train = train.len(),
            valid = valid.map_or(0, Dataset::len),
            n_epoch,
            batch_size,
            "training started"
        );

        let outside = Cursor {
            epoch: 0,
            n_epoch,
            train: true,
            size: train.len(),
        };
        registry.notify(&mut outside.context(Event::TrainBegin, model, &mut observation))?;

        for epoch in 1..=n_epoch {
            let cursor = Cursor { epoch, ..outside };
            registry.notify(&mut cursor.context(Event::EpochBegin, model, &mut observation))?;

            observation.clear();
            registry.notify(&mut cursor.context(Event::EpochTrainBegin, model, &mut observation))?;
            for batch in train.batches(batch_size, rng.as_mut()) {
                registry.notify(&mut batch_context(cursor, Event::BatchBegin, model, &mut observation, batch))?;

                let ys = model.forward(&batch, true)?;
                let loss = model.compute_loss(&ys, &batch)?;
                let loss_value = scalar(&loss)?;

                let mut grads = loss.backward()?;
                let mut update = UpdateContext {
                    vars: &vars,
                    grads: &mut grads,
                    learning_rate: optimizer.learning_rate(),
                    step: *steps,
                };
                for hook in optimizer_hooks.iter_mut() {
                    if let Err(e) = hook.on_update(&mut update) {
                        error!(hook = hook.name(), step = *steps, error = %e, "optimizer hook failed");
                        return Err(e);
                    }
                }
                let learning_rate = update.learning_rate;
                optimizer.set_learning_rate(learning_rate);
                optimizer.step(&grads)?;
                *steps += 1;

                observation.report("loss", loss_value);
                let mut ctx = batch_context(cursor, Event::BatchEnd, model, &mut observation, batch);
                ctx.ys = Some(&ys);
                ctx.loss = Some(loss_value);
                registry.notify(&mut ctx)?;
            }
            registry.notify(&mut cursor.context(Event::EpochTrainEnd, model, &mut observation))?;
            info!(epoch, n_epoch, phase = "train", "{observation}");

            if let Some(valid) = valid {
                let cursor = Cursor {
                    train: false,
                    size: valid.len(),
                    ..cursor
                };
                observation.clear();
                registry.notify(&mut cursor.context(Event::EpochValidateBegin, model, &mut observation))?;
                for batch in valid.batches(batch_size, None) {
                    registry.notify(&mut batch_context(cursor, Event::BatchBegin, model, &mut observation, batch))?;

                    let ys = model.forward(&batch, false)?;
                    let loss_value = scalar(&model.compute_loss(&ys, &batch)?)?;

                    observation.report("loss", loss_value);
                    let mut ctx = batch_context(cursor, Event::BatchEnd, model, &mut observation, batch);
                    ctx.ys = Some(&ys);
                    ctx.loss = Some(loss_value);
                    registry.notify(&mut ctx)?;
                }
                registry.notify(&mut cursor.context(Event::EpochValidateEnd, model, &mut observation))?;
                info!(epoch, n_epoch, phase = "validation", "{observation}");
            }

            registry.notify(&mut cursor.context(Event::EpochEnd, model, &mut observation))?;
        }

        registry.notify(&mut outside.context(Event::TrainEnd, model, &mut observation))?;
        info!(steps = *steps, "training finished");
        Ok(())
    }
}

fn batch_context<'a, M: DependencyParser>(
    cursor: Cursor,
    event: Event,
    model: &'a M,
    observation: &'a mut Observation,
    batch: Batch<'a>,
) -> EventContext<'a, M> {
    let mut ctx = cursor.context(event, model, observation);
    ctx.batch = Some(batch);
    ctx
}

/// Trainable parameters as a flat list, in the order the model returns them.
pub fn parameter_count(vars: &[Var]) -> usize {
    vars.iter().map(|v| v.elem_count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::listener::DEFAULT_PRIORITY;
    use crate::training::testing::{treebank, StubParser};
    use candle_nn::{ParamsAdamW, SGD};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct EventRecorder {
        log: Log,
    }

    impl EventRecorder {
        fn push(&self, ctx: &EventContext<'_, StubParser>) {
            let mark = if ctx.train { "" } else { "~" };
            self.log.borrow_mut().push(format!("{mark}{}", ctx.event));
        }
    }

    impl Listener<StubParser> for EventRecorder {
        fn on_train_begin(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_begin(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_train_begin(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_batch_begin(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_batch_end(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            assert!(ctx.ys.is_some() && ctx.loss.is_some() && ctx.batch.is_some());
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_train_end(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_validate_begin(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_validate_end(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_epoch_end(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
        fn on_train_end(&mut self, ctx: &mut EventContext<'_, StubParser>) -> Result<()> {
            self.push(ctx);
            Ok(())
        }
    }

    fn sgd_trainer(lr: f64) -> Trainer<StubParser, SGD> {
        let model = StubParser::new();
        let optimizer = SGD::new(model.trainable_vars(), lr).unwrap();
        Trainer::new(model, optimizer)
    }

    #[test]
    fn events_fire_in_order() {
        let (_, dataset) = treebank();
        let log: Log = Rc::default();
        let mut trainer = sgd_trainer(0.1);
        trainer.add_listener(Box::new(EventRecorder { log: Rc::clone(&log) }), DEFAULT_PRIORITY);

        // A budget of 3 tokens puts each sentence in its own batch.
        trainer.fit(&dataset, Some(&dataset), 1, 3).unwrap();

        let expected = [
            "train_begin",
            "epoch_begin",
            "epoch_train_begin",
            "batch_begin",
            "batch_end",
            "batch_begin",
            "batch_end",
            "epoch_train_end",
            "~epoch_validate_begin",
            "~batch_begin",
            "~batch_end",
            "~batch_begin",
            "~batch_end",
            "~epoch_validate_end",
            "epoch_end",
            "train_end",
        ];
        assert_eq!(*log.borrow(), expected);
        assert_eq!(trainer.steps(), 2);
    }

    #[test]
    fn validation_events_need_validation_data() {
        let (_, dataset) = treebank();
        let log: Log = Rc::default();
        let mut trainer = sgd_trainer(0.1);
        trainer.add_listener(Box::new(EventRecorder { log: Rc::clone(&log) }), DEFAULT_PRIORITY);

        trainer.fit(&dataset, None, 2, 100).unwrap();
        assert!(log.borrow().iter().all(|e| !e.contains("validate")));
        assert_eq!(log.borrow().iter().filter(|e| *e == "epoch_end").count(), 2);
    }

    #[test]
    fn training_moves_parameters_towards_target() {
        let (_, dataset) = treebank();
        let mut trainer = sgd_trainer(0.25);
        trainer.fit(&dataset, None, 10, 100).unwrap();

        let w = trainer.model().weight.as_tensor().to_scalar::<f32>().unwrap();
        assert!((w - 1.0).abs() < 0.01, "weight {w}");
    }

    #[test]
    fn optimizer_hooks_drive_learning_rate() {
        use crate::training::hooks::ExponentialDecayAnnealing;

        let (_, dataset) = treebank();
        let model = StubParser::new();
        let params = ParamsAdamW {
            lr: 1.0,
            ..Default::default()
        };
        let optimizer = candle_nn::AdamW::new(model.trainable_vars(), params).unwrap();
        let mut trainer = Trainer::new(model, optimizer);
        trainer.add_optimizer_hook(Box::new(ExponentialDecayAnnealing::new(1.0, 0.5, 1)));

        trainer.fit(&dataset, None, 1, 3).unwrap();
        // The second update ran with 1.0 * 0.5^1.
        assert_eq!(trainer.steps(), 2);
        assert!((trainer.optimizer().learning_rate() - 0.5).abs() < 1e-12);
    }

    struct Refuse;

    impl OptimizerHook for Refuse {
        fn name(&self) -> &str {
            "refuse"
        }

        fn on_update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<()> {
            Err(crate::error::TrainError::Checkpoint("refused".into()))
        }
    }

    #[test]
    fn failing_optimizer_hook_stops_before_the_step() {
        use crate::training::hooks::GradientClipping;

        let (_, dataset) = treebank();
        let mut trainer = sgd_trainer(0.25);
        trainer.add_optimizer_hook(Box::new(GradientClipping::new(5.0)));
        trainer.add_optimizer_hook(Box::new(Refuse));
        assert_eq!(trainer.optimizer_hook_names(), vec!["gradient_clipping", "refuse"]);

        assert!(trainer.fit(&dataset, None, 1, 3).is_err());
        assert_eq!(trainer.steps(), 0);
    }

    #[test]
    fn hooks_can_read_the_observation() {
        let (_, dataset) = treebank();
        let seen: Rc<RefCell<Vec<f64>>> = Rc::default();
        let mut trainer = sgd_trainer(0.1);
        let sink = Rc::clone(&seen);
        trainer.add_hook(
            Event::EpochTrainEnd,
            DEFAULT_PRIORITY,
            Box::new(move |ctx| {
                sink.borrow_mut().extend(ctx.observation.get("loss"));
                Ok(())
            }),
        );

        trainer.fit(&dataset, None, 2, 100).unwrap();
        let losses = seen.borrow();
        assert_eq!(losses.len(), 2);
        assert!(losses[1] < losses[0]);
    }

    #[test]
    fn shuffled_training_still_sees_every_batch() {
        let (_, dataset) = treebank();
        let mut trainer = sgd_trainer(0.1).with_shuffle(7);
        trainer.fit(&dataset, None, 3, 3).unwrap();
        assert_eq!(trainer.steps(), 6);
    }

    #[test]
    fn counts_parameters() {
        let model = StubParser::new();
        assert_eq!(parameter_count(&model.trainable_vars()), 1);
    }
}
