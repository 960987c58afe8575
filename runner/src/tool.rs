use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use std::{
    fs::{self, File},
    os::unix::process::CommandExt,
    path::Path,
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// tool output captured next to the unit's results
pub const STDOUT_CAPTURE: &str = "tool_stdout.log";
pub const STDERR_CAPTURE: &str = "tool_stderr.log";

// how long a signalled process group gets before SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// What one tool invocation came to. Everything that can go wrong per unit
/// folds into `TimedOut` or `Failed`; aborting the rank is never an option
/// here.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Completed {
        total_time: f64,
        phase_a_time: f64,
        phase_b_time: f64,
    },
    TimedOut,
    Failed {
        detail: String,
    },
}

/// Run `exec [params...] <input> <out_dir>` in its own process group with
/// stdout/stderr captured to files in `out_dir`, bounded by `timeout`.
pub fn invoke(
    exec: &Path,
    params: &[String],
    input: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> ToolOutcome {
    let stdout = match File::create(out_dir.join(STDOUT_CAPTURE)) {
        Ok(file) => file,
        Err(error) => {
            return ToolOutcome::Failed {
                detail: format!("failed to create the stdout capture: {error}"),
            }
        }
    };
    let stderr_path = out_dir.join(STDERR_CAPTURE);
    let stderr = match File::create(&stderr_path) {
        Ok(file) => file,
        Err(error) => {
            return ToolOutcome::Failed {
                detail: format!("failed to create the stderr capture: {error}"),
            }
        }
    };

    let started = Instant::now();
    // the tool gets its own process group so a timeout can reclaim every
    // descendant it spawned, not just the immediate child
    let mut child = match Command::new(exec)
        .args(params)
        .arg(input)
        .arg(out_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0)
        .spawn()
    {
        Ok(child) => child,
        Err(error) => {
            return ToolOutcome::Failed {
                detail: format!("failed to spawn {}: {error}", exec.to_string_lossy()),
            }
        }
    };

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            let total_time = started.elapsed().as_secs_f64();

            if status.success() {
                let (phase_a_time, phase_b_time) = phase_times(&stderr_path);
                debug!(total_time = total_time, "Tool finished");

                ToolOutcome::Completed {
                    total_time,
                    phase_a_time,
                    phase_b_time,
                }
            } else {
                ToolOutcome::Failed {
                    detail: format!("tool exited with {status}"),
                }
            }
        }
        Ok(None) => {
            terminate_group(&mut child);

            ToolOutcome::TimedOut
        }
        Err(error) => {
            let _ = child.kill();
            let _ = child.wait();

            ToolOutcome::Failed {
                detail: format!("failed to wait for the tool: {error}"),
            }
        }
    }
}

/// SIGTERM the whole process group, give it a grace period, then SIGKILL
/// whatever is left and reap the child.
fn terminate_group(child: &mut Child) {
    let group = Pid::from_raw(child.id() as i32);

    if let Err(error) = killpg(group, Signal::SIGTERM) {
        warn!(error = ?error, pid = child.id(), "Failed to signal the tool process group");
    }

    match child.wait_timeout(TERMINATE_GRACE) {
        Ok(Some(status)) => debug!(status = ?status, "Tool group terminated"),
        _ => {
            warn!(pid = child.id(), "Tool ignored SIGTERM, killing the process group");
            let _ = killpg(group, Signal::SIGKILL);
            let _ = child.wait();
        }
    }
}

/// Harvest the optional `phase_a_time: <secs>` / `phase_b_time: <secs>`
/// lines a tool may emit on stderr. Absent lines read as zero.
pub fn phase_times(stderr_capture: &Path) -> (f64, f64) {
    let content = match fs::read_to_string(stderr_capture) {
        Ok(content) => content,
        Err(_) => return (0.0, 0.0),
    };

    let mut phase_a = 0.0;
    let mut phase_b = 0.0;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("phase_a_time:") {
            phase_a = value.trim().parse().unwrap_or(0.0);
        } else if let Some(value) = line.strip_prefix("phase_b_time:") {
            phase_b = value.trim().parse().unwrap_or(0.0);
        }
    }

    (phase_a, phase_b)
}

/// The tool's completion contract: the run counts as done once every
/// expected output filename exists in the unit directory.
pub fn outputs_present(outputs: &[String], unit_dir: &Path) -> bool {
    !outputs.is_empty() && outputs.iter().all(|name| unit_dir.join(name).exists())
}
