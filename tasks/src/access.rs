use std::{
    collections::HashMap,
    error::Error,
    fmt, fs, io,
    num::NonZeroUsize,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use machine_learning::{Model, ModelInstance, ModelState, ModelType};
use parking_lot::Mutex;

use crate::{config::RegistryConfig, handle::ModelHandle, task::SharedContext};

/// Identifies the object that asks for models, such as an actor or a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

/// Reasons a model can't be resolved or persisted.
#[derive(Debug)]
pub enum AccessErr {
    /// The data path is empty, absolute or escapes the data directory.
    InvalidPath(String),
    /// The persisted model is of a different type than requested.
    TypeMismatch {
        path: PathBuf,
        expected: ModelType,
        found: ModelType,
    },
    /// The model wasn't obtained from this registry.
    Unregistered { model: u64 },
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for AccessErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessErr::InvalidPath(path) => write!(f, "invalid data path '{path}'"),
            AccessErr::TypeMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "{} holds a {found} model, expected {expected}",
                path.display()
            ),
            AccessErr::Unregistered { model } => {
                write!(f, "model {model} doesn't belong to this registry")
            }
            AccessErr::Io { path, source } => write!(f, "{}: {source}", path.display()),
            AccessErr::Format { path, source } => {
                write!(f, "{} is not a valid model: {source}", path.display())
            }
        }
    }
}

impl Error for AccessErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AccessErr::Io { source, .. } => Some(source),
            AccessErr::Format { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<AccessErr> for io::Error {
    fn from(value: AccessErr) -> Self {
        match value {
            AccessErr::Io { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// What a call site gets back from the registry.
#[derive(Debug, Clone)]
pub struct ModelAccess {
    pub model: ModelHandle,
    /// The model state private to the call site.
    pub context: SharedContext,
    pub is_trained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CallSite {
    owner: OwnerId,
    node_id: String,
    file: PathBuf,
}

/// Resolves models by data path and type, loading them from disk the first time.
///
/// Every call site asking for the same file shares one model, while each
/// `(owner, node id)` pair gets a model state of its own.
#[derive(Debug)]
pub struct ModelRegistry {
    root: PathBuf,
    window: NonZeroUsize,
    smoothing: Option<f32>,
    models: HashMap<PathBuf, ModelHandle>,
    sites: HashMap<CallSite, SharedContext>,
}

impl ModelRegistry {
    /// Creates a new `ModelRegistry` rooted at `root`, using default model states.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&RegistryConfig {
            data_dir: root.into(),
            ..RegistryConfig::default()
        })
    }

    /// Creates a new `ModelRegistry` from its configuration.
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            root: config.data_dir.clone(),
            window: config.window,
            smoothing: config.smoothing,
            models: HashMap::new(),
            sites: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves or creates a model and the model state of the asking call site.
    ///
    /// # Arguments
    /// * `owner` - The object asking for the model.
    /// * `data_path` - Where the model is persisted, relative to the registry root.
    /// * `model_type` - The type of model expected at `data_path`.
    /// * `node_id` - Tells apart the call sites of a single owner.
    ///
    /// # Returns
    /// The shared model, the call site's model state and whether the model is trained.
    pub fn get_model(
        &mut self,
        owner: OwnerId,
        data_path: &str,
        model_type: ModelType,
        node_id: &str,
    ) -> Result<ModelAccess, AccessErr> {
        let file = self.resolve(data_path, model_type)?;

        let model = match self.models.get(&file) {
            Some(model) => model.clone(),
            None => {
                let model = ModelHandle::new(load(&file, model_type)?);
                self.models.insert(file.clone(), model.clone());
                model
            }
        };

        let site = CallSite {
            owner,
            node_id: node_id.to_string(),
            file,
        };

        let (window, smoothing) = (self.window, self.smoothing);
        let context = self.sites.entry(site).or_insert_with(|| {
            let state = ModelState::new(window);
            let state = match smoothing {
                Some(alpha) => state.with_smoothing(alpha),
                None => state,
            };
            Arc::new(Mutex::new(state))
        });

        Ok(ModelAccess {
            is_trained: model.is_trained(),
            model,
            context: Arc::clone(context),
        })
    }

    /// Writes a model obtained from this registry back to its file.
    ///
    /// # Returns
    /// The path of the written file.
    pub fn save(&self, model: &ModelHandle) -> Result<PathBuf, AccessErr> {
        let file = self
            .models
            .iter()
            .find_map(|(file, handle)| handle.ptr_eq(model).then_some(file))
            .ok_or(AccessErr::Unregistered { model: model.id() })?;

        let io_err = |source| AccessErr::Io {
            path: file.clone(),
            source,
        };

        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let json =
            serde_json::to_string_pretty(&model.snapshot()).map_err(|source| AccessErr::Format {
                path: file.clone(),
                source,
            })?;

        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, file).map_err(io_err)?;

        info!(model_id = model.id(), path:% = file.display(); "model saved");
        Ok(file.clone())
    }

    /// Drops the model states of every call site of `owner`.
    pub fn forget(&mut self, owner: OwnerId) {
        self.sites.retain(|site, _| site.owner != owner);
    }

    fn resolve(&self, data_path: &str, model_type: ModelType) -> Result<PathBuf, AccessErr> {
        let path = Path::new(data_path);
        let valid = !data_path.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !valid {
            return Err(AccessErr::InvalidPath(data_path.to_string()));
        }

        Ok(self
            .root
            .join(format!("{data_path}.{}.json", model_type.tag())))
    }
}

/// Reads a persisted model, or creates an untrained one if there's no file yet.
fn load(file: &Path, model_type: ModelType) -> Result<ModelInstance, AccessErr> {
    let json = match fs::read_to_string(file) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path:% = file.display(); "no persisted model, starting untrained");
            return Ok(ModelInstance::new(model_type));
        }
        Err(source) => {
            return Err(AccessErr::Io {
                path: file.to_path_buf(),
                source,
            });
        }
    };

    let model: ModelInstance =
        serde_json::from_str(&json).map_err(|source| AccessErr::Format {
            path: file.to_path_buf(),
            source,
        })?;

    if model.model_type() != model_type {
        return Err(AccessErr::TypeMismatch {
            path: file.to_path_buf(),
            expected: model_type,
            found: model.model_type(),
        });
    }

    debug!(path:% = file.display(), trained = model.is_trained(); "model loaded");
    Ok(model)
}
