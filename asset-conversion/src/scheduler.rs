/// Batch conversion of texture files through an external converter.
///
/// A single coordinating thread polls a table of tasks on a fixed interval.
/// Conversions run as independent processes, at most `budget` at a time.
use crate::config::ConversionConfig;
use crate::error::{IoContext, Result};
use crate::texture_set::{TextureKind, classify_file_name, list_file_names, strip_extension};
use constants::texture::TEXTURE_CONTAINER_EXTENSION;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

const PROGRESS_TEMPLATE: &str = "[{bar:40.green/blue}] {pos}/{len} textures ({percent}%) {msg}";

/// Why a conversion did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The converter exited with a non-zero status.
    ExitCode(i32),
    /// The converter was killed before reporting a status.
    Terminated,
    /// The converter could not be started.
    Launch(String),
    /// The converter's status could not be queried.
    Poll(String),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::ExitCode(code) => write!(f, "return code {}", code),
            TaskFailure::Terminated => write!(f, "no return code (terminated by a signal)"),
            TaskFailure::Launch(reason) => write!(f, "launch error: {}", reason),
            TaskFailure::Poll(reason) => write!(f, "lost process status: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed(TaskFailure),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed(_))
    }
}

/// One texture file to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: TextureKind,
    pub state: TaskState,
}

impl ConversionTask {
    pub fn new(source: PathBuf, destination: PathBuf, kind: TextureKind) -> Self {
        Self {
            source,
            destination,
            kind,
            state: TaskState::Pending,
        }
    }

    /// Format code passed to the converter.
    pub fn format_code(&self) -> u32 {
        self.kind.format_code()
    }

    /// Log line for a terminated task, naming its source texture.
    pub fn termination_message(&self) -> String {
        match &self.state {
            TaskState::Failed(failure) => {
                format!("Failed for {} with {}.", self.source.display(), failure)
            }
            _ => format!("Finished {}", self.source.display()),
        }
    }
}

/// Exit status of a finished job. `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobExit {
    pub code: Option<i32>,
}

impl JobExit {
    fn into_state(self) -> TaskState {
        match self.code {
            Some(0) => TaskState::Succeeded,
            Some(code) => TaskState::Failed(TaskFailure::ExitCode(code)),
            None => TaskState::Failed(TaskFailure::Terminated),
        }
    }
}

/// A running conversion that can be checked without blocking.
pub trait JobHandle {
    /// `Ok(None)` while the job is still running.
    fn poll(&mut self) -> io::Result<Option<JobExit>>;
}

/// Starts conversions.
pub trait JobLauncher {
    type Handle: JobHandle;

    fn launch(&mut self, task: &ConversionTask) -> io::Result<Self::Handle>;
}

impl JobHandle for Child {
    fn poll(&mut self) -> io::Result<Option<JobExit>> {
        Ok(self
            .try_wait()?
            .map(|status| JobExit { code: status.code() }))
    }
}

/// Runs `<converter> <format_code> <source> <destination>` per task.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    converter: PathBuf,
}

impl ProcessLauncher {
    pub fn new(converter: impl Into<PathBuf>) -> Self {
        Self {
            converter: converter.into(),
        }
    }
}

impl JobLauncher for ProcessLauncher {
    type Handle = Child;

    fn launch(&mut self, task: &ConversionTask) -> io::Result<Child> {
        Command::new(&self.converter)
            .arg(task.format_code().to_string())
            .arg(&task.source)
            .arg(&task.destination)
            .stdin(Stdio::null())
            .spawn()
    }
}

struct Job<H> {
    task: ConversionTask,
    handle: Option<H>,
}

/// Admission-controlled set of conversion jobs.
///
/// `launched - terminated` never exceeds the budget. Tasks start in list
/// order and each one is launched at most once.
pub struct ConversionPool<L: JobLauncher> {
    launcher: L,
    budget: usize,
    jobs: Vec<Job<L::Handle>>,
    next_pending: usize,
    launched: usize,
    terminated: usize,
    peak_in_flight: usize,
    termination_order: Vec<usize>,
}

impl<L: JobLauncher> ConversionPool<L> {
    /// A budget of zero is raised to one.
    pub fn new(launcher: L, tasks: Vec<ConversionTask>, budget: usize) -> Self {
        Self {
            launcher,
            budget: budget.max(1),
            jobs: tasks
                .into_iter()
                .map(|task| Job { task, handle: None })
                .collect(),
            next_pending: 0,
            launched: 0,
            terminated: 0,
            peak_in_flight: 0,
            termination_order: Vec::new(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn launched(&self) -> usize {
        self.launched
    }

    pub fn terminated(&self) -> usize {
        self.terminated
    }

    pub fn in_flight(&self) -> usize {
        self.launched - self.terminated
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn is_finished(&self) -> bool {
        self.terminated == self.jobs.len()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ConversionTask> {
        self.jobs.iter().map(|job| &job.task)
    }

    /// One polling iteration: admit pending tasks while the budget allows,
    /// then check every running job once. Terminal tasks are handed to
    /// `on_outcome` in the order they are observed.
    pub fn step(&mut self, on_outcome: &mut impl FnMut(&ConversionTask)) {
        while self.next_pending < self.jobs.len() && self.in_flight() < self.budget {
            let index = self.next_pending;
            self.next_pending += 1;
            self.launched += 1;

            let job = &mut self.jobs[index];
            match self.launcher.launch(&job.task) {
                Ok(handle) => {
                    job.handle = Some(handle);
                    job.task.state = TaskState::Running;
                }
                Err(e) => {
                    job.task.state = TaskState::Failed(TaskFailure::Launch(e.to_string()));
                    self.terminated += 1;
                    self.termination_order.push(index);
                    on_outcome(&job.task);
                }
            }
            self.peak_in_flight = self.peak_in_flight.max(self.in_flight());
        }
        debug_assert!(self.in_flight() <= self.budget);

        for (index, job) in self.jobs[..self.next_pending].iter_mut().enumerate() {
            let Some(handle) = job.handle.as_mut() else {
                continue;
            };
            let state = match handle.poll() {
                Ok(None) => continue,
                Ok(Some(exit)) => exit.into_state(),
                Err(e) => TaskState::Failed(TaskFailure::Poll(e.to_string())),
            };
            job.handle = None;
            job.task.state = state;
            self.terminated += 1;
            self.termination_order.push(index);
            on_outcome(&job.task);
        }
    }

    /// Steps until every task is terminal, sleeping between iterations.
    pub fn run(
        mut self,
        poll_interval: Duration,
        mut on_outcome: impl FnMut(&ConversionTask),
    ) -> BatchReport {
        loop {
            self.step(&mut on_outcome);
            if self.is_finished() {
                break;
            }
            thread::sleep(poll_interval);
        }
        self.into_report()
    }

    fn into_report(self) -> BatchReport {
        let mut tasks: Vec<Option<ConversionTask>> =
            self.jobs.into_iter().map(|job| Some(job.task)).collect();
        let outcomes = self
            .termination_order
            .iter()
            .filter_map(|&index| tasks[index].take())
            .collect();
        BatchReport {
            outcomes,
            peak_in_flight: self.peak_in_flight,
        }
    }
}

/// Terminal tasks of a batch, in termination order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ConversionTask>,
    pub peak_in_flight: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|task| task.state == TaskState::Succeeded)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ConversionTask, &TaskFailure)> {
        self.outcomes.iter().filter_map(|task| match &task.state {
            TaskState::Failed(failure) => Some((task, failure)),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Lists the texture files of `source_dir` that need converting.
///
/// The destination of `<stem>.<ext>` is `<destination_dir>/<stem>.vkt`.
pub fn discover_tasks(
    source_dir: &Path,
    destination_dir: &Path,
    skip_existing: bool,
) -> Result<Vec<ConversionTask>> {
    let mut tasks = Vec::new();
    for file_name in list_file_names(source_dir)? {
        let Some(texture) = classify_file_name(&file_name) else {
            continue;
        };
        let destination = destination_dir.join(format!(
            "{}.{}",
            strip_extension(&file_name),
            TEXTURE_CONTAINER_EXTENSION
        ));
        if skip_existing && destination.exists() {
            log::debug!("Skipping {}, {} exists", file_name, destination.display());
            continue;
        }
        tasks.push(ConversionTask::new(
            source_dir.join(&file_name),
            destination,
            texture.kind,
        ));
    }
    Ok(tasks)
}

/// Converts every eligible texture of `source` into `destination`.
///
/// Individual conversion failures are logged and collected in the report,
/// only filesystem errors abort the batch.
pub fn convert_textures(
    destination: &Path,
    source: &Path,
    config: &ConversionConfig,
) -> Result<BatchReport> {
    fs::create_dir_all(destination).at(destination)?;
    let tasks = discover_tasks(source, destination, config.skip_existing)?;
    let budget = config.effective_budget();
    log::info!("Using {} threads to convert materials.", budget);
    log::info!("{} textures to convert", tasks.len());

    let pb = ProgressBar::new(tasks.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏"),
    );
    pb.set_message("Converting textures");

    let pool = ConversionPool::new(ProcessLauncher::new(&config.converter_path), tasks, budget);
    let report = pool.run(config.poll_interval, |task| {
        pb.suspend(|| {
            if matches!(task.state, TaskState::Failed(_)) {
                log::error!("{}", task.termination_message());
            } else {
                log::info!("{}", task.termination_message());
            }
        });
        pb.inc(1);
    });
    pb.finish_with_message("Textures converted");

    log::info!(
        "{} conversions succeeded, {} failed, at most {} ran at once",
        report.succeeded(),
        report.failed(),
        report.peak_in_flight
    );
    Ok(report)
}
