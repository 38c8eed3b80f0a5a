use std::{
    env,
    error::Error,
    fmt, fs, io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
};

use serde::Deserialize;

use crate::dispatch::{Dispatcher, ImmediateDispatcher, WorkerPool};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_WINDOW: usize = 32;

/// Failures while reading the configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Io { path: PathBuf, source: io::Error },
    Format { path: PathBuf, source: serde_json::Error },
    /// An environment variable holds a value that can't be parsed.
    InvalidVar { name: &'static str, value: String },
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Io { path, source } => write!(f, "{}: {source}", path.display()),
            ConfigErr::Format { path, source } => {
                write!(f, "{} is not a valid config: {source}", path.display())
            }
            ConfigErr::InvalidVar { name, value } => write!(f, "invalid value for {name}: '{value}'"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::Io { source, .. } => Some(source),
            ConfigErr::Format { source, .. } => Some(source),
            ConfigErr::InvalidVar { .. } => None,
        }
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ConfigErr> for io::Error {
    fn from(value: ConfigErr) -> Self {
        match value {
            ConfigErr::Io { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// How tasks are run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Run tasks on a worker pool instead of the calling thread.
    pub background: bool,
    /// The amount of tasks that may run at the same time.
    pub workers: NonZeroUsize,
    /// The maximum amount of tasks waiting on a single model, unbounded if absent.
    pub max_backlog: Option<NonZeroUsize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            background: true,
            workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            max_backlog: None,
        }
    }
}

impl DispatchConfig {
    /// Builds the dispatcher this configuration describes.
    ///
    /// # Returns
    /// The dispatcher or an io error if the worker threads couldn't be started.
    pub fn dispatcher(&self) -> io::Result<Box<dyn Dispatcher>> {
        if !self.background {
            return Ok(Box::new(ImmediateDispatcher::new()));
        }

        Ok(Box::new(WorkerPool::new(self.workers, self.max_backlog)?))
    }
}

/// Where models live and how their states are set up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// The directory data paths are resolved against.
    pub data_dir: PathBuf,
    /// The amount of feature vectors each model state keeps.
    pub window: NonZeroUsize,
    /// Output smoothing weight for new model states, disabled if absent.
    pub smoothing: Option<f32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            window: NonZeroUsize::new(DEFAULT_WINDOW).unwrap_or(NonZeroUsize::MIN),
            smoothing: None,
        }
    }
}

/// The complete configuration of a host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub registry: RegistryConfig,
}

impl Config {
    /// Reads a configuration from a JSON file, missing fields take their default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigErr> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&json).map_err(|source| ConfigErr::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the configuration from the environment.
    ///
    /// The file named by `INTERACTML_CONFIG` is read first, if set. Then `INTERACTML_WORKERS`,
    /// `INTERACTML_BACKGROUND`, `INTERACTML_DATA_DIR` and `INTERACTML_MAX_BACKLOG` override
    /// their respective fields.
    pub fn from_env() -> Result<Self, ConfigErr> {
        let mut config = match env::var_os("INTERACTML_CONFIG") {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };

        config.override_with(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Overrides fields with the values returned by `var`.
    ///
    /// # Arguments
    /// * `var` - Looks up a variable by name.
    pub fn override_with<F>(&mut self, var: F) -> Result<(), ConfigErr>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = parse(&var, "INTERACTML_WORKERS")? {
            self.dispatch.workers = workers;
        }

        if let Some(background) = parse(&var, "INTERACTML_BACKGROUND")? {
            self.dispatch.background = background;
        }

        if let Some(max_backlog) = parse::<usize, _>(&var, "INTERACTML_MAX_BACKLOG")? {
            // Zero lifts the limit.
            self.dispatch.max_backlog = NonZeroUsize::new(max_backlog);
        }

        if let Some(data_dir) = var("INTERACTML_DATA_DIR") {
            self.registry.data_dir = PathBuf::from(data_dir);
        }

        Ok(())
    }
}

fn parse<T, F>(var: &F, name: &'static str) -> Result<Option<T>, ConfigErr>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = var(name) else {
        return Ok(None);
    };

    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigErr::InvalidVar { name, value }),
    }
}
