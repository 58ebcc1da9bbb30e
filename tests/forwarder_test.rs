//! Integration tests for the metric forwarder lifecycle

use std::collections::HashMap;

use ndarray::ArrayD;
use tablero::{
    Frequency, FrequencyUnit, InMemoryWriter, JsonlWriter, MetricForwarder, Phase, ScalarEvent,
    StateValue, SummaryWriter, TableroError, TrainerView,
};

struct ScriptedTrainer {
    iteration: u64,
    epoch: u64,
    states: HashMap<String, StateValue>,
}

impl ScriptedTrainer {
    fn new() -> Self {
        Self {
            iteration: 0,
            epoch: 0,
            states: HashMap::new(),
        }
    }

    fn set(&mut self, key: &str, value: StateValue) {
        self.states.insert(key.to_string(), value);
    }
}

impl TrainerView for ScriptedTrainer {
    fn iteration_count(&self) -> u64 {
        self.iteration
    }

    fn epoch_count(&self) -> u64 {
        self.epoch
    }

    fn get_state(&self, key: &str) -> Option<StateValue> {
        self.states.get(key).cloned()
    }
}

#[test]
fn test_full_training_lifecycle() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new()
        .with_log_images_every(Frequency::new(5, FrequencyUnit::Iterations).expect("valid"));
    let mut trainer = ScriptedTrainer::new();

    for iteration in 0..10 {
        trainer.iteration = iteration;
        trainer.set(
            "training_loss",
            StateValue::Scalar(1.0 / (iteration as f64 + 1.0)),
        );
        trainer.set("learning_rate", StateValue::Scalar(0.001));
        trainer.set(
            "training_inputs",
            StateValue::FloatTensor(ArrayD::zeros(vec![1, 1, 4, 4])),
        );
        forwarder
            .end_of_training_iteration(&trainer)
            .expect("operation should succeed");
    }

    trainer.iteration = 10;
    trainer.set("validation_loss_averaged", StateValue::Scalar(0.05));
    forwarder
        .end_of_validation_run(&trainer)
        .expect("operation should succeed");

    let writer = forwarder.writer().expect("operation should succeed");
    // Two scalars per training iteration plus one validation scalar
    assert_eq!(writer.scalars().len(), 21);
    // Image gate fired at iterations 0 and 5
    assert_eq!(writer.images().len(), 2);
    assert!(writer
        .scalars()
        .iter()
        .any(|e| e.tag == "validation_loss_averaged" && e.step == 10));
}

#[test]
fn test_observe_unobserve_contract() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new();

    forwarder
        .observe("gradient_norm", Phase::Training)
        .expect("operation should succeed");
    assert!(forwarder.registry().contains("gradient_norm", Phase::Training));

    forwarder
        .unobserve("gradient_norm", Phase::Training)
        .expect("operation should succeed");
    let err = forwarder
        .unobserve("gradient_norm", Phase::Training)
        .expect_err("double unobserve must fail");
    assert!(matches!(err, TableroError::KeyNotObserved { .. }));
}

#[test]
fn test_derived_training_and_validation_keys() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new();
    forwarder
        .observe_training_and_validation_state("dice_score")
        .expect("operation should succeed");

    let mut trainer = ScriptedTrainer::new();
    trainer.iteration = 3;
    trainer.set("training_dice_score", StateValue::Scalar(0.8));
    trainer.set("validation_dice_score", StateValue::Scalar(0.75));

    forwarder
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");
    forwarder
        .end_of_validation_run(&trainer)
        .expect("operation should succeed");

    let writer = forwarder.writer().expect("operation should succeed");
    let tags: Vec<&str> = writer.scalars().iter().map(|e| e.tag.as_str()).collect();
    assert!(tags.contains(&"training_dice_score"));
    assert!(tags.contains(&"validation_dice_score"));
}

#[test]
fn test_volume_states_emit_mid_slice_images() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new();
    let mut trainer = ScriptedTrainer::new();
    trainer.set(
        "training_prediction",
        StateValue::FloatTensor(ArrayD::zeros(vec![2, 1, 8, 4, 4])),
    );

    forwarder
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");

    let writer = forwarder.writer().expect("operation should succeed");
    assert_eq!(writer.images().len(), 2);
    assert!(writer.images().iter().all(|e| e.tag.ends_with("/slice_4")));
}

#[test]
fn test_snapshot_survives_restart() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new()
        .with_log_scalars_every(Frequency::new(2, FrequencyUnit::Iterations).expect("valid"));
    forwarder
        .observe("training_iou", Phase::Training)
        .expect("operation should succeed");

    let mut trainer = ScriptedTrainer::new();
    trainer.set("training_iou", StateValue::Scalar(0.6));
    forwarder
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");

    let snapshot = forwarder.to_snapshot().expect("operation should succeed");
    let mut restored: MetricForwarder<InMemoryWriter> =
        MetricForwarder::from_snapshot(&snapshot).expect("operation should succeed");

    // Registry and gate cadence survive; iteration 1 is off-cadence for the
    // restored every-2 gate that last fired at iteration 0.
    assert!(restored.registry().contains("training_iou", Phase::Training));
    trainer.iteration = 1;
    restored
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");
    assert!(restored
        .writer()
        .expect("operation should succeed")
        .scalars()
        .is_empty());

    trainer.iteration = 2;
    restored
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");
    assert_eq!(
        restored
            .writer()
            .expect("operation should succeed")
            .scalars()
            .len(),
        1
    );
}

#[test]
fn test_jsonl_backend_end_to_end() {
    let dir = tempfile::tempdir().expect("operation should succeed");
    let mut forwarder: MetricForwarder<JsonlWriter> =
        MetricForwarder::new().with_log_directory(dir.path());

    let mut trainer = ScriptedTrainer::new();
    trainer.iteration = 7;
    trainer.set("training_loss", StateValue::Scalar(0.33));
    forwarder
        .end_of_training_iteration(&trainer)
        .expect("operation should succeed");

    let contents = std::fs::read_to_string(dir.path().join("scalars.jsonl"))
        .expect("operation should succeed");
    let events: Vec<ScalarEvent> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("operation should succeed"))
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tag, "training_loss");
    assert_eq!(events[0].step, 7);
}

#[test]
fn test_histogram_logging_always_fails() {
    let mut forwarder: MetricForwarder<InMemoryWriter> = MetricForwarder::new();
    let err = forwarder
        .log_histogram("weights", &[0.1, 0.2], 1)
        .expect_err("histograms are unimplemented");
    assert!(matches!(err, TableroError::HistogramUnimplemented));
}

#[test]
fn test_writer_trait_object_safety_across_backends() {
    fn assert_writer<W: SummaryWriter>() {}
    assert_writer::<InMemoryWriter>();
    assert_writer::<JsonlWriter>();
}
