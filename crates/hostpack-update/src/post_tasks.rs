//! Best-effort tasks run after a successful merge
//!
//! A failing task never fails the update; the pipeline records its error as
//! a warning and moves on to the next task.

use crate::context::{DeploymentRoot, Operation, UpdateContext};
use hostpack_archive::apply_permission_map;
use hostpack_core::types::CommandSpec;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Files kept when clearing a cache directory
const KEEP_IN_CACHE: &[&str] = &[".gitignore"];

/// A post-task failure
#[derive(Error, Debug)]
#[error("post-task '{task}' failed: {message}")]
pub struct TaskError {
    pub task: String,
    pub message: String,
}

impl TaskError {
    pub fn new(task: impl Into<String>, message: impl ToString) -> Self {
        Self {
            task: task.into(),
            message: message.to_string(),
        }
    }
}

/// What a post-task sees of the deployment
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub code_root: PathBuf,
    pub roots: Vec<DeploymentRoot>,
}

impl TaskContext {
    pub fn from_update_context(ctx: &UpdateContext) -> Self {
        Self {
            code_root: ctx.code_root.clone(),
            roots: ctx.roots(Operation::Merge),
        }
    }
}

/// A step run after the merge
pub trait PostTask: Send + Sync {
    fn name(&self) -> &str;

    /// Run the task, returning a one-line summary
    fn run(&self, ctx: &TaskContext) -> Result<String, TaskError>;
}

/// Reapplies the fixed permission map to every deployment root
#[derive(Debug, Default)]
pub struct PermissionsTask;

impl PostTask for PermissionsTask {
    fn name(&self) -> &str {
        "permissions"
    }

    fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let mut changed = 0;
        let mut skipped = 0;
        for root in &ctx.roots {
            let (count, warnings) = apply_permission_map(&root.path, &root.filter)
                .map_err(|e| TaskError::new(self.name(), e))?;
            changed += count;
            skipped += warnings.len();
        }
        Ok(format!("{} paths updated, {} skipped", changed, skipped))
    }
}

/// Empties cache directories under the code root
#[derive(Debug)]
pub struct ClearCacheTask {
    dirs: Vec<String>,
}

impl ClearCacheTask {
    pub fn new(dirs: Vec<String>) -> Self {
        Self { dirs }
    }
}

impl PostTask for ClearCacheTask {
    fn name(&self) -> &str {
        "clear-cache"
    }

    fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let mut removed = 0;
        for dir in &self.dirs {
            let path = ctx.code_root.join(dir);
            if !path.is_dir() {
                debug!("Cache directory {} does not exist", path.display());
                continue;
            }
            removed += clear_dir(&path).map_err(|e| {
                TaskError::new(self.name(), format!("{}: {}", path.display(), e))
            })?;
        }
        Ok(format!("{} cache entries removed", removed))
    }
}

fn clear_dir(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if KEEP_IN_CACHE.iter().any(|keep| name.to_str() == Some(*keep)) {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// Captured result of an external command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Runs an external program in the code root
#[derive(Debug)]
pub struct CommandTask {
    name: String,
    command: CommandSpec,
}

impl CommandTask {
    pub fn new(command: CommandSpec) -> Self {
        let name = std::iter::once(command.program.as_str())
            .chain(command.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self { name, command }
    }

    /// Run the command and capture its output, whatever the exit status
    pub fn execute(&self, cwd: &Path) -> std::io::Result<CommandOutput> {
        debug!("Running {} in {}", self.name, cwd.display());
        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(cwd)
            .output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

impl PostTask for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &TaskContext) -> Result<String, TaskError> {
        let output = self
            .execute(&ctx.code_root)
            .map_err(|e| TaskError::new(&self.name, e))?;

        match output.exit_code {
            Some(0) => Ok(output.stdout.trim().lines().last().unwrap_or("ok").to_string()),
            code => Err(TaskError::new(
                &self.name,
                format!(
                    "exited with {}: {}",
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    output.stderr.trim()
                ),
            )),
        }
    }
}

/// The configured task list: permissions first, then cache clearing, then
/// commands in order
pub fn default_tasks(ctx: &UpdateContext) -> Vec<Box<dyn PostTask>> {
    let mut tasks: Vec<Box<dyn PostTask>> = vec![Box::new(PermissionsTask)];
    if !ctx.post_tasks.clear_cache_dirs.is_empty() {
        tasks.push(Box::new(ClearCacheTask::new(
            ctx.post_tasks.clear_cache_dirs.clone(),
        )));
    }
    tasks.extend(
        ctx.post_tasks
            .commands
            .iter()
            .cloned()
            .map(|command| Box::new(CommandTask::new(command)) as Box<dyn PostTask>),
    );
    tasks
}

/// Run every task, collecting failures as warnings
pub fn run_all(tasks: &[Box<dyn PostTask>], ctx: &TaskContext) -> Vec<String> {
    let mut warnings = Vec::new();
    for task in tasks {
        match task.run(ctx) {
            Ok(summary) => info!("Post-task {}: {}", task.name(), summary),
            Err(e) => {
                warn!("{}", e);
                warnings.push(e.to_string());
            }
        }
    }
    warnings
}
