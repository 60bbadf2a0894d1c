//! Scheduler Binding
//! Registers the prompt agent to run at logon and startup, and removes it again.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info};

use crate::config::PromptConfig;
use crate::error::{InstallError, SchedulerError, UninstallError};
use crate::store::AcceptanceStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSet {
    pub at_logon: bool,
    pub at_startup: bool,
    /// Re-run the logon trigger at this interval while the user stays signed in.
    pub repeat_every: Option<Duration>,
}

impl TriggerSet {
    pub fn from_config(config: &PromptConfig) -> Self {
        let repeat_every = match config.reminder_hours {
            0 => None,
            hours => Some(Duration::from_secs(u64::from(hours) * 3600)),
        };
        Self {
            at_logon: true,
            at_startup: true,
            repeat_every,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.at_logon && !self.at_startup
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleInstances {
    /// A trigger firing while an instance is running does nothing.
    IgnoreNew,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub description: String,
    pub triggers: TriggerSet,
    pub command: TaskCommand,
    pub multiple_instances: MultipleInstances,
}

pub trait TaskScheduler {
    /// Creates the task, replacing any task with the same name.
    fn register(&self, task: &TaskDefinition) -> Result<(), SchedulerError>;
    /// Returns `Ok(false)` when no such task exists.
    fn unregister(&self, name: &str) -> Result<bool, SchedulerError>;
    fn is_registered(&self, name: &str) -> Result<bool, SchedulerError>;
}

pub struct SchedulerBinding<'a> {
    scheduler: &'a dyn TaskScheduler,
    store: &'a dyn AcceptanceStore,
    task_name: String,
    description: String,
}

impl<'a> SchedulerBinding<'a> {
    pub fn new(
        scheduler: &'a dyn TaskScheduler,
        store: &'a dyn AcceptanceStore,
        task_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            store,
            task_name: task_name.into(),
            description: description.into(),
        }
    }

    pub fn install(&self, triggers: TriggerSet, command: TaskCommand) -> Result<(), InstallError> {
        if triggers.is_empty() {
            return Err(InstallError::EmptyTriggerSet);
        }
        self.store.prepare()?;

        let task = TaskDefinition {
            name: self.task_name.clone(),
            description: self.description.clone(),
            triggers,
            command,
            multiple_instances: MultipleInstances::IgnoreNew,
        };
        self.scheduler
            .register(&task)
            .map_err(|source| InstallError::Register {
                task: self.task_name.clone(),
                source,
            })?;

        info!(
            "Registered scheduled task {} -> {:?}",
            self.task_name, task.command.program
        );
        Ok(())
    }

    pub fn uninstall(&self) -> Result<(), UninstallError> {
        let existed = self
            .scheduler
            .unregister(&self.task_name)
            .map_err(|source| UninstallError::Unregister {
                task: self.task_name.clone(),
                source,
            })?;
        if existed {
            info!("Removed scheduled task {}", self.task_name);
        } else {
            info!("Scheduled task {} was not registered", self.task_name);
        }

        self.store.clear()?;
        info!("Cleared acceptance record");
        Ok(())
    }

    pub fn is_installed(&self) -> Result<bool, SchedulerError> {
        self.scheduler.is_registered(&self.task_name)
    }
}

// --- Windows Task Scheduler ---

const SCHTASKS: &str = "schtasks";
const USERS_GROUP_SID: &str = "S-1-5-32-545";
/// Printed by `/Query` and `/Delete` for an unknown task name.
const TASK_NOT_FOUND: [&str; 2] = ["cannot find", "does not exist"];

/// Drives `schtasks.exe` with an XML task definition.
#[derive(Debug)]
pub struct SchtasksScheduler {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl Default for SchtasksScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchtasksScheduler {
    pub fn new() -> Self {
        Self::with_launcher(SCHTASKS, Vec::new())
    }

    /// Runs `program leading_args... <schtasks args>` instead of `schtasks`.
    pub fn with_launcher(program: impl Into<PathBuf>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn run(&self, args: &[&str]) -> Result<Output, SchedulerError> {
        debug!("{} {}", self.program_name(), args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).args(args);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command.output().map_err(|source| SchedulerError::Launch {
            program: self.program_name(),
            source,
        })
    }

    fn failure(&self, output: &Output) -> SchedulerError {
        SchedulerError::Command {
            program: self.program_name(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// `Ok(true)` on success, `Ok(false)` when the task does not exist.
    fn run_on_task(&self, args: &[&str]) -> Result<bool, SchedulerError> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if TASK_NOT_FOUND.iter().any(|needle| stderr.contains(needle)) {
            return Ok(false);
        }
        Err(self.failure(&output))
    }
}

impl TaskScheduler for SchtasksScheduler {
    fn register(&self, task: &TaskDefinition) -> Result<(), SchedulerError> {
        let xml = render_task_xml(task);

        let mut staged = tempfile::Builder::new()
            .prefix("terms_gate_task")
            .suffix(".xml")
            .tempfile()
            .map_err(|source| SchedulerError::Staging {
                path: std::env::temp_dir(),
                source,
            })?;
        let path = staged.path().to_path_buf();
        staged
            .write_all(&encode_utf16_with_bom(&xml))
            .and_then(|_| staged.flush())
            .map_err(|source| SchedulerError::Staging {
                path: path.clone(),
                source,
            })?;

        let path_arg = path.to_string_lossy().into_owned();
        // /F replaces an existing task of the same name.
        let output = self.run(&["/Create", "/TN", &task.name, "/XML", &path_arg, "/F"])?;
        if output.status.success() {
            return Ok(());
        }
        Err(self.failure(&output))
    }

    fn unregister(&self, name: &str) -> Result<bool, SchedulerError> {
        self.run_on_task(&["/Delete", "/TN", name, "/F"])
    }

    fn is_registered(&self, name: &str) -> Result<bool, SchedulerError> {
        self.run_on_task(&["/Query", "/TN", name])
    }
}

fn encode_utf16_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Task Scheduler 1.2 schema definition for `task`.
pub fn render_task_xml(task: &TaskDefinition) -> String {
    let mut triggers = String::new();
    if task.triggers.at_logon {
        triggers.push_str("    <LogonTrigger>\n      <Enabled>true</Enabled>\n");
        if let Some(interval) = task.triggers.repeat_every {
            triggers.push_str(&format!(
                "      <Repetition>\n        <Interval>{}</Interval>\n        <StopAtDurationEnd>false</StopAtDurationEnd>\n      </Repetition>\n",
                iso8601_duration(interval)
            ));
        }
        triggers.push_str("    </LogonTrigger>\n");
    }
    // With a group principal this only fires if a member is already signed in;
    // the logon trigger is what prompts after a reboot.
    if task.triggers.at_startup {
        triggers.push_str("    <BootTrigger>\n      <Enabled>true</Enabled>\n    </BootTrigger>\n");
    }

    let policy = match task.multiple_instances {
        MultipleInstances::IgnoreNew => "IgnoreNew",
    };

    let arguments = if task.command.args.is_empty() {
        String::new()
    } else {
        format!(
            "      <Arguments>{}</Arguments>\n",
            xml_escape(&join_arguments(&task.command.args))
        )
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-16"?>
<Task version="1.2" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">
  <RegistrationInfo>
    <Description>{description}</Description>
    <URI>{uri}</URI>
  </RegistrationInfo>
  <Triggers>
{triggers}  </Triggers>
  <Principals>
    <Principal id="Author">
      <GroupId>{group}</GroupId>
      <RunLevel>LeastPrivilege</RunLevel>
    </Principal>
  </Principals>
  <Settings>
    <MultipleInstancesPolicy>{policy}</MultipleInstancesPolicy>
    <DisallowStartIfOnBatteries>false</DisallowStartIfOnBatteries>
    <StopIfGoingOnBatteries>false</StopIfGoingOnBatteries>
    <StartWhenAvailable>true</StartWhenAvailable>
    <ExecutionTimeLimit>PT0S</ExecutionTimeLimit>
    <Enabled>true</Enabled>
    <Hidden>false</Hidden>
  </Settings>
  <Actions Context="Author">
    <Exec>
      <Command>{command}</Command>
{arguments}    </Exec>
  </Actions>
</Task>
"#,
        description = xml_escape(&task.description),
        uri = xml_escape(&task.name),
        triggers = triggers,
        group = USERS_GROUP_SID,
        policy = policy,
        command = xml_escape(&task.command.program.to_string_lossy()),
        arguments = arguments,
    )
}

fn iso8601_duration(interval: Duration) -> String {
    let minutes = (interval.as_secs() / 60).max(1);
    if minutes % 60 == 0 {
        format!("PT{}H", minutes / 60)
    } else {
        format!("PT{}M", minutes)
    }
}

/// Quotes arguments the way `CommandLineToArgvW` splits them back.
fn join_arguments(args: &[String]) -> String {
    args.iter()
        .map(|arg| quote_argument(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // Backslashes before a quote are doubled, then the quote is escaped.
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes would otherwise escape the closing quote.
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
    out
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// --- In-memory scheduler ---

#[derive(Default)]
pub struct MemoryScheduler {
    tasks: Mutex<BTreeMap<String, TaskDefinition>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<TaskDefinition> {
        self.tasks
            .lock()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, TaskDefinition>>, SchedulerError> {
        self.tasks
            .lock()
            .map_err(|_| SchedulerError::Backend("scheduler lock poisoned".to_string()))
    }
}

impl TaskScheduler for MemoryScheduler {
    fn register(&self, task: &TaskDefinition) -> Result<(), SchedulerError> {
        self.lock()?.insert(task.name.clone(), task.clone());
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(self.lock()?.remove(name).is_some())
    }

    fn is_registered(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(self.lock()?.contains_key(name))
    }
}
