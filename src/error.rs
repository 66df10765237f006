#[cfg(feature = "live")]
use std::sync::mpsc::{RecvError, SendError};

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KarakuriError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error("Locale discovery failed:\n{0}")]
    Locales(#[from] LocaleError),

    #[error("Packaging requested but no locale definitions were found")]
    NoLocales,

    #[error("Required command '{0}' is not available in the environment")]
    MissingTool(String),

    #[error("Error while building:\n{0}")]
    Build(#[from] BuildError),

    #[error("Error while packaging:\n{0}")]
    Archive(#[from] ArchiveError),

    #[error("Deploy snapshot failed:\n{0}")]
    Snapshot(String),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Output directory '{0}' must be a relative path under the target root")]
    OutputEscapesRoot(Utf8PathBuf),

    #[error("Output root '{0}' lies inside the source root")]
    RootInSource(Utf8PathBuf),

    #[error("Couldn't read configuration file.\n{0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Couldn't parse configuration file.\n{0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task '{0}' is already registered")]
    Duplicate(String),

    #[error("Task '{0}' is not registered")]
    Unknown(String),

    #[error("Composition cycle involving task '{0}'")]
    Cycle(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Task '{0}':\n{1}")]
    Task(String, anyhow::Error),
}

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("Couldn't read locale definitions.\n{0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Locale file '{0}' is not valid JSON.\n{1}")]
    Parse(Utf8PathBuf, serde_json::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't write zip archive.\n{0}")]
    Zip(#[from] zip::result::ZipError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't bind the live-reload socket.\n{0}")]
    Bind(std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error(transparent)]
    Send(#[from] SendError<crate::reload::Signal>),
}
