#![doc = include_str!("../README.md")]

mod archive;
mod config;
mod error;
mod executor;
mod locale;
mod pipeline;
mod plan;
mod reload;
mod revision;
mod site;
pub mod stage;
mod task;
mod utils;
#[cfg(feature = "live")]
mod watch;
mod workspace;

pub use crate::config::{Binding, Config, Features, Paths, Target};
pub use crate::error::*;
pub use crate::executor::{Outcome, RunSummary};
pub use crate::locale::{Locale, LocaleSet};
pub use crate::pipeline::Pipeline;
pub use crate::plan::plan;
pub use crate::reload::{Notifier, NullNotifier, Signal};
pub use crate::revision::{MANIFEST_NAME, Manifest};
pub use crate::site::Site;
pub use crate::task::{Blueprint, Compose, Registry, RunContext, TaskReport, TaskResult};
pub use crate::workspace::{FsWorkspace, Workspace};
