//! Configuration type definitions

mod runtime_config;

pub use runtime_config::{
    BackupConfig, CommandSpec, ExclusionsConfig, LayoutConfig, NetworkConfig, PostTasksConfig,
    ReleaseConfig, RootExclusions,
};
