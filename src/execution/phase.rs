//! Concurrent execution of one phase
//!
//! Every descriptor in a phase is started at once as its own child process,
//! each in a process group of its own. The first failure terminates the
//! siblings that are still running: SIGTERM to the whole group first, then
//! SIGKILL once the grace period runs out.

use colored::Colorize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

use crate::config::Config;
use crate::task::{round_secs, CheckResult, TaskDescriptor};

/// Exit code reported for a check stopped because a sibling failed
pub const TERMINATED_EXIT_CODE: i32 = 143;
/// Exit code reported for a check stopped by the phase timeout
pub const TIMED_OUT_EXIT_CODE: i32 = 124;

const TERMINATED_MESSAGE: &str = "terminated after a sibling check failed";

/// Output still buffered after exit gets this long to reach the console
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

#[cfg(unix)]
const GROUP_POLL: Duration = Duration::from_millis(50);

/// Process groups of the checks that are currently running
#[derive(Debug, Clone, Default)]
pub struct ProcessGroups(Arc<Mutex<BTreeSet<u32>>>);

impl ProcessGroups {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, pgid: u32) -> GroupGuard {
        self.lock().insert(pgid);
        GroupGuard {
            groups: self.clone(),
            pgid,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// SIGTERM every running check along with everything it spawned.
    /// Checks live outside the terminal's foreground group, so an
    /// interrupted greenlight has to pass the signal on itself.
    pub fn terminate_all(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            for pgid in self.lock().iter() {
                let _ = killpg(Pid::from_raw(*pgid as i32), Signal::SIGTERM);
            }
        }
    }
}

struct GroupGuard {
    groups: ProcessGroups,
    pgid: u32,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.groups.lock().remove(&self.pgid);
    }
}

/// Runs the descriptors of a phase concurrently with kill-on-failure
#[derive(Debug, Clone)]
pub struct PhaseExecutor {
    base_dir: PathBuf,
    timeout: Option<Duration>,
    kill_grace: Duration,
    groups: ProcessGroups,
    /// Name of a check whose driver panics instead of running it
    #[cfg(test)]
    crashing_driver: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    deadline: Instant,
    timeout: Duration,
}

struct TaskContext {
    base_dir: PathBuf,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel: watch::Receiver<bool>,
    groups: ProcessGroups,
    budget: Option<Budget>,
    kill_grace: Duration,
}

enum Stop {
    Exited(io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

impl PhaseExecutor {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            timeout: None,
            kill_grace: Duration::from_secs(5),
            groups: ProcessGroups::default(),
            #[cfg(test)]
            crashing_driver: None,
        }
    }

    pub fn from_config(base_dir: &Path, config: &Config) -> Self {
        Self::new(base_dir)
            .with_timeout(config.phase_timeout())
            .with_kill_grace(config.kill_grace())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_crashing_driver(mut self, name: &str) -> Self {
        self.crashing_driver = Some(name.to_string());
        self
    }

    /// Handle on the process groups this executor has running
    pub fn process_groups(&self) -> ProcessGroups {
        self.groups.clone()
    }

    /// Run every descriptor and wait for the phase to settle.
    ///
    /// Results come back in descriptor order. A check whose driver task
    /// died is replaced by an orchestration failure appended at the end.
    pub async fn run(&self, tasks: &[TaskDescriptor]) -> Vec<CheckResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let cancel = Arc::new(watch::channel(false).0);
        let budget = self.timeout.map(|timeout| Budget {
            deadline: Instant::now() + timeout,
            timeout,
        });

        let mut join_set = JoinSet::new();
        for (index, task) in tasks.iter().cloned().enumerate() {
            #[cfg(test)]
            {
                if self.crashing_driver.as_deref() == Some(task.name.as_str()) {
                    join_set.spawn(crashing_driver(task));
                    continue;
                }
            }

            let ctx = TaskContext {
                base_dir: self.base_dir.clone(),
                cancel_tx: cancel.clone(),
                cancel: cancel.subscribe(),
                groups: self.groups.clone(),
                budget,
                kill_grace: self.kill_grace,
            };
            join_set.spawn(async move { (index, run_task(task, ctx).await) });
        }

        let mut slots: Vec<Option<CheckResult>> = vec![None; tasks.len()];
        let mut orchestration = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if !result.success() {
                        cancel.send_replace(true);
                    }
                    slots[index] = Some(result);
                }
                Err(e) => {
                    cancel.send_replace(true);
                    eprintln!("{} Check driver failed: {}", "✗".red(), e);
                    orchestration.push(CheckResult::Orchestration {
                        exit_code: 1,
                        message: format!("check driver failed: {}", e),
                    });
                }
            }
        }

        slots.into_iter().flatten().chain(orchestration).collect()
    }
}

async fn run_task(task: TaskDescriptor, mut ctx: TaskContext) -> CheckResult {
    let prefix = format!("[{}]", task.name)
        .color(task.color.as_str())
        .bold()
        .to_string();
    println!("{} {} {}", "→".blue(), prefix, task.command.dimmed());

    let start = Instant::now();
    let mut child = match shell_command(&task.command)
        .current_dir(&ctx.base_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            eprintln!("{} {} failed to start: {}", "✗".red(), prefix, e);
            ctx.cancel_tx.send_replace(true);
            return CheckResult::failed(task, -1, format!("failed to start: {}", e));
        }
    };
    let pgid = child.id();
    let _registered = pgid.map(|pgid| ctx.groups.register(pgid));

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, prefix.clone(), false));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, prefix.clone(), true));
    }

    let stop = tokio::select! {
        biased;
        status = child.wait() => Stop::Exited(status),
        _ = ctx.cancel.wait_for(|cancelled| *cancelled) => Stop::Cancelled,
        _ = deadline_reached(ctx.budget) => Stop::TimedOut,
    };

    let (exit_code, message) = match stop {
        Stop::Exited(Ok(status)) => (exit_code(status), None),
        Stop::Exited(Err(e)) => (-1, Some(format!("failed to wait for process: {}", e))),
        Stop::Cancelled => {
            terminate(&mut child, pgid, ctx.kill_grace).await;
            (TERMINATED_EXIT_CODE, Some(TERMINATED_MESSAGE.to_string()))
        }
        Stop::TimedOut => {
            terminate(&mut child, pgid, ctx.kill_grace).await;
            let timeout = ctx.budget.map(|b| b.timeout.as_secs_f64()).unwrap_or_default();
            (TIMED_OUT_EXIT_CODE, Some(format!("timed out after {}s", timeout)))
        }
    };
    let duration = round_secs(start.elapsed().as_secs_f64());

    // Siblings stop now, not after this check's output has drained
    if exit_code != 0 {
        ctx.cancel_tx.send_replace(true);
    }

    // A grandchild can hold the pipes open after the shell is gone
    if tokio::time::timeout(OUTPUT_DRAIN, futures::future::join_all(pumps.iter_mut()))
        .await
        .is_err()
    {
        for pump in &pumps {
            pump.abort();
        }
    }

    if exit_code == 0 {
        println!("{} {} exited with code 0", "✓".green(), prefix);
    } else {
        println!("{} {} exited with code {}", "✗".red(), prefix, exit_code);
    }

    CheckResult::Task {
        task,
        exit_code,
        duration_secs: Some(duration),
        message,
    }
}

#[cfg(test)]
async fn crashing_driver(task: TaskDescriptor) -> (usize, CheckResult) {
    panic!("driver for {} crashed", task.name)
}

/// `sh -c` leading a new process group, so the whole tree can be signalled
#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Echo a child stream line by line behind the check's prefix
fn pump<R>(reader: R, prefix: String, to_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(&['\r', '\n'][..]);
                    if to_stderr {
                        eprintln!("{} {}", prefix, line);
                    } else {
                        println!("{} {}", prefix, line);
                    }
                }
            }
        }
    })
}

async fn deadline_reached(budget: Option<Budget>) {
    match budget {
        Some(budget) => sleep_until(budget.deadline).await,
        None => std::future::pending().await,
    }
}

/// SIGTERM the check's process group, then SIGKILL whatever is still in it
/// when the grace period runs out
#[cfg(unix)]
async fn terminate(child: &mut Child, pgid: Option<u32>, grace: Duration) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid else {
        kill_child(child).await;
        return;
    };
    let group = Pid::from_raw(pgid as i32);

    let _ = killpg(group, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    let mut exited = false;
    loop {
        if !exited {
            exited = matches!(child.try_wait(), Ok(Some(_)));
        }
        // Done once the shell is reaped and nothing is left in its group
        if exited && killpg(group, None).is_err() {
            return;
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(GROUP_POLL).await;
    }

    let _ = killpg(group, Signal::SIGKILL);
    if !exited {
        if let Err(e) = child.wait().await {
            eprintln!("{} Failed to reap process: {}", "⚠".yellow(), e);
        }
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _pgid: Option<u32>, _grace: Duration) {
    kill_child(child).await;
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        eprintln!("{} Failed to kill process: {}", "⚠".yellow(), e);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
