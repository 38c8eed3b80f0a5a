use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use machine_learning::{Example, Model, ModelInstance, ModelType, TrainResult};
use parking_lot::{Mutex, MutexGuard};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct ModelCell {
    id: u64,
    model_type: ModelType,
    trained: AtomicBool,
    model: Mutex<ModelInstance>,
}

/// A shared reference to a model.
///
/// Cloning the handle shares the same model. Whether the model is trained is mirrored in an
/// atomic, so it can be queried while a task holds the model.
#[derive(Debug, Clone)]
pub struct ModelHandle(Arc<ModelCell>);

impl ModelHandle {
    /// Creates a new `ModelHandle` that owns `model`.
    pub fn new(model: impl Into<ModelInstance>) -> Self {
        let model = model.into();

        Self(Arc::new(ModelCell {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            model_type: model.model_type(),
            trained: AtomicBool::new(model.is_trained()),
            model: Mutex::new(model),
        }))
    }

    /// A process unique identifier of the model.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn model_type(&self) -> ModelType {
        self.0.model_type
    }

    /// Whether the model can be sampled, as of the last completed training.
    pub fn is_trained(&self) -> bool {
        self.0.trained.load(Ordering::Acquire)
    }

    /// Copies the model out, waiting for any task currently holding it.
    pub fn snapshot(&self) -> ModelInstance {
        self.0.model.lock().clone()
    }

    /// Whether both handles share the same model.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Locks the model for sampling.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ModelInstance> {
        self.0.model.lock()
    }

    /// Trains the model and refreshes the trained flag.
    ///
    /// # Arguments
    /// * `examples` - The labeled training set.
    pub(crate) fn train(&self, examples: &[Example]) -> TrainResult<()> {
        let mut model = self.0.model.lock();
        let ret = model.train(examples);
        self.0.trained.store(model.is_trained(), Ordering::Release);
        ret
    }
}

impl From<ModelInstance> for ModelHandle {
    fn from(value: ModelInstance) -> Self {
        Self::new(value)
    }
}
