//! [`ContainerRuntime`] backed by the `docker` CLI, or any CLI that speaks
//! the same dialect (`podman`).

use crate::error::Error;
use crate::spec::{ContainerInfo, ContainerSpec, ContainerSummary, ListFilter, RawStats};
use crate::{ContainerRuntime, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sandbox_cgroups::CgroupReader;
use sandbox_proto::ContainerStatus;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Default bound on CLI calls other than `wait`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default gap between the two counter samples of `stats`.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_millis(250);

/// Container runtime driven through a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    command_timeout: Duration,
    stats_interval: Duration,
    cgroups: CgroupReader,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use another docker-compatible binary, e.g. `podman`
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            stats_interval: DEFAULT_STATS_INTERVAL,
            cgroups: CgroupReader::new(),
        }
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn output(&self, args: &[String], bound: Option<Duration>) -> Result<Output> {
        debug!("Running {} {}", self.binary, args.join(" "));
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawned = match bound {
            Some(bound) => tokio::time::timeout(bound, command.output())
                .await
                .map_err(|_| {
                    Error::DaemonUnavailable(format!(
                        "`{} {}` did not answer within {}s",
                        self.binary,
                        args.first().map(String::as_str).unwrap_or_default(),
                        bound.as_secs()
                    ))
                })?,
            None => command.output().await,
        };

        spawned.map_err(|e| {
            Error::DaemonUnavailable(format!("failed to run {}: {}", self.binary, e))
        })
    }

    /// Run a command and return its stdout, mapping failures for `subject`.
    async fn run(&self, args: &[String], subject: &str) -> Result<String> {
        self.run_bounded(args, subject, Some(self.command_timeout)).await
    }

    async fn run_bounded(
        &self,
        args: &[String],
        subject: &str,
        bound: Option<Duration>,
    ) -> Result<String> {
        let output = self.output(args, bound).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(
                &format!("{} {}", self.binary, args.first().map(String::as_str).unwrap_or_default()),
                output.status.code(),
                stderr.trim(),
                subject,
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments of the `create` call for `spec`.
pub fn create_args(spec: &ContainerSpec) -> Result<Vec<String>> {
    if spec.image.is_empty() {
        return Err(Error::InvalidSpec("image is empty".into()));
    }
    if spec.command.is_empty() {
        return Err(Error::InvalidSpec("command is empty".into()));
    }

    let mut args: Vec<String> = vec![
        "create".into(),
        "--name".into(),
        spec.name.clone(),
        "--pull=never".into(),
        "--init".into(),
        "--cap-drop".into(),
        "ALL".into(),
        "--security-opt".into(),
        "no-new-privileges".into(),
    ];
    if let Some(profile) = &spec.seccomp_profile {
        args.push("--security-opt".into());
        args.push(format!("seccomp={}", profile.display()));
    }
    if spec.read_only_root {
        args.push("--read-only".into());
    }
    for tmpfs in &spec.tmpfs {
        args.push("--tmpfs".into());
        args.push(tmpfs.mount_arg());
    }
    for mount in &spec.mounts {
        args.push("--mount".into());
        args.push(
            mount
                .mount_arg()
                .map_err(|e| Error::InvalidSpec(e.to_string()))?,
        );
    }
    args.extend([
        "--network".into(),
        spec.network.as_str().into(),
        "--memory".into(),
        spec.memory_bytes.to_string(),
        "--memory-swap".into(),
        spec.memory_swap_bytes.to_string(),
        "--cpus".into(),
        spec.cpus.to_string(),
        "--pids-limit".into(),
        spec.pids_limit.to_string(),
        "--user".into(),
        spec.user.to_string(),
    ]);
    for (key, value) in &spec.labels {
        args.push("--label".into());
        args.push(format!("{}={}", key, value));
    }
    if let Some(dir) = &spec.working_dir {
        args.push("--workdir".into());
        args.push(dir.clone());
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    Ok(args)
}

/// One `logs --timestamps` stream as `(timestamp, line)` pairs. A line
/// without a parseable prefix inherits the previous line's timestamp.
fn timestamped_lines(stream: &str) -> Vec<(Option<DateTime<Utc>>, &str)> {
    let mut last = None;
    stream
        .lines()
        .map(|line| {
            let parsed = line.split_once(' ').and_then(|(stamp, rest)| {
                DateTime::parse_from_rfc3339(stamp)
                    .ok()
                    .map(|at| (at.with_timezone(&Utc), rest))
            });
            match parsed {
                Some((at, rest)) => {
                    last = Some(at);
                    (last, rest)
                }
                None => (last, line),
            }
        })
        .collect()
}

/// Interleave the stdout and stderr of `logs --timestamps` in time order and
/// strip the timestamps. Ties go to stdout; each stream keeps its own order.
fn merge_timestamped(stdout: &str, stderr: &str) -> String {
    let out = timestamped_lines(stdout);
    let err = timestamped_lines(stderr);
    let (mut i, mut j) = (0, 0);
    let mut merged = String::with_capacity(stdout.len() + stderr.len());
    while i < out.len() || j < err.len() {
        let take_out = match (out.get(i), err.get(j)) {
            (Some(_), None) => true,
            (None, _) => false,
            (Some((a, _)), Some((b, _))) => match (a, b) {
                (Some(a), Some(b)) => a <= b,
                _ => true,
            },
        };
        let line = if take_out {
            i += 1;
            out[i - 1].1
        } else {
            j += 1;
            err[j - 1].1
        };
        merged.push_str(line);
        merged.push('\n');
    }
    merged
}

/// Map a failed CLI call to a typed error.
fn classify_failure(command: &str, code: Option<i32>, stderr: &str, subject: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no such container")
        || lower.contains("no such object")
        || lower.contains("no container with name or id")
    {
        Error::NotFound(subject.to_string())
    } else if lower.contains("no such image")
        || lower.contains("image not known")
        || lower.contains("unable to find image")
    {
        Error::ImageNotFound(subject.to_string())
    } else if lower.contains("is not running") || lower.contains("container state improper") {
        Error::NotRunning(subject.to_string())
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("unable to connect to podman")
        || lower.contains("permission denied while trying to connect")
    {
        Error::DaemonUnavailable(stderr.to_string())
    } else {
        Error::CommandFailed {
            command: command.to_string(),
            code,
            stderr: stderr.to_string(),
        }
    }
}

/// Engine status string to [`ContainerStatus`]; podman has a few extra names.
fn parse_status(raw: &str) -> Result<ContainerStatus> {
    let word = raw.split_whitespace().next().unwrap_or_default().to_ascii_lowercase();
    match word.as_str() {
        "stopped" | "stopping" => Ok(ContainerStatus::Exited),
        "configured" | "initialized" => Ok(ContainerStatus::Created),
        "up" => Ok(ContainerStatus::Running),
        other => other.parse().map_err(Error::Parse),
    }
}

/// RFC 3339 timestamp; the zero time engines use for "never" maps to `None`.
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.year() > 1)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created: Option<String>,
    state: InspectState,
    #[serde(default)]
    config: Option<InspectConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    pid: Option<i64>,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(rename = "OOMKilled", default)]
    oom_killed: bool,
    #[serde(default)]
    finished_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

/// Parse the JSON array printed by `inspect`.
fn parse_inspect(stdout: &str) -> Result<Option<ContainerInfo>> {
    let docs: Vec<InspectDoc> =
        serde_json::from_str(stdout).map_err(|e| Error::Parse(format!("inspect output: {}", e)))?;
    let Some(doc) = docs.into_iter().next() else {
        return Ok(None);
    };

    let status = parse_status(&doc.state.status)?;
    let running = status == ContainerStatus::Running;
    Ok(Some(ContainerInfo {
        id: doc.id,
        name: doc.name.trim_start_matches('/').to_string(),
        status,
        exit_code: (!running).then_some(doc.state.exit_code).flatten(),
        pid: doc
            .state
            .pid
            .filter(|pid| *pid > 0)
            .and_then(|pid| u32::try_from(pid).ok()),
        oom_killed: doc.state.oom_killed,
        labels: doc.config.and_then(|c| c.labels).unwrap_or_default(),
        created_at: parse_timestamp(doc.created.as_deref()),
        finished_at: parse_timestamp(doc.state.finished_at.as_deref()),
    }))
}

/// Parse `ps` rows formatted as `ID\tNAME\tSTATE`.
fn parse_ps(stdout: &str) -> Result<Vec<ContainerSummary>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split('\t');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(id), Some(name), Some(state)) => Ok(ContainerSummary {
                    id: id.trim().to_string(),
                    name: name.trim().trim_start_matches('/').to_string(),
                    status: parse_status(state)?,
                }),
                _ => Err(Error::Parse(format!("ps row '{}'", line))),
            }
        })
        .collect()
}

fn ps_args(filter: &ListFilter) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "ps".into(),
        "--all".into(),
        "--no-trunc".into(),
        "--format".into(),
        "{{.ID}}\t{{.Names}}\t{{.State}}".into(),
    ];
    for (key, value) in &filter.labels {
        args.push("--filter".into());
        args.push(format!("label={}={}", key, value));
    }
    for status in &filter.statuses {
        args.push("--filter".into());
        args.push(format!("status={}", status));
    }
    args
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn ping(&self) -> Result<()> {
        self.run(&strings(&["info", "--format", "{{json .ID}}"]), &self.binary)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                Error::CommandFailed { stderr, .. } => Error::DaemonUnavailable(stderr),
                other => other,
            })
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let args = create_args(spec)?;
        let stdout = self.run(&args, &spec.image).await?;
        let id = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Parse("create printed no container id".into()))?
            .to_string();
        info!("Created container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.run(&strings(&["start", id]), id).await.map(|_| ())
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let stdout = self
            .run_bounded(&strings(&["wait", id]), id, None)
            .await?;
        stdout
            .trim()
            .lines()
            .last()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| Error::Parse(format!("wait printed '{}'", stdout.trim())))
    }

    /// The engine returns the container's stdout and stderr on separate
    /// pipes, so both are fetched with timestamps and interleaved by them.
    async fn logs(&self, id: &str) -> Result<String> {
        let args = strings(&["logs", "--timestamps", id]);
        let output = self.output(&args, Some(self.command_timeout)).await?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(classify_failure(
                &format!("{} logs", self.binary),
                output.status.code(),
                stderr.trim(),
                id,
            ));
        }
        Ok(merge_timestamped(&String::from_utf8_lossy(&output.stdout), &stderr))
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<()> {
        let seconds = grace.as_secs() + u64::from(grace.subsec_nanos() > 0);
        self.run(&strings(&["stop", "--time", &seconds.to_string(), id]), id)
            .await
            .map(|_| ())
    }

    async fn kill(&self, id: &str) -> Result<()> {
        self.run(&strings(&["kill", id]), id).await.map(|_| ())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let mut args = strings(&["rm"]);
        if force {
            args.push("--force".into());
        }
        args.push(id.to_string());
        self.run(&args, id).await.map(|_| ())
    }

    async fn inspect(&self, id: &str) -> Result<Option<ContainerInfo>> {
        match self
            .run(&strings(&["inspect", "--type", "container", id]), id)
            .await
        {
            Ok(stdout) => parse_inspect(&stdout),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        let stdout = self.run(&ps_args(filter), "ps").await?;
        parse_ps(&stdout)
    }

    async fn stats(&self, id: &str) -> Result<RawStats> {
        let info = self
            .inspect(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let pid = match (info.status, info.pid) {
            (ContainerStatus::Running, Some(pid)) => pid,
            _ => return Err(Error::NotRunning(id.to_string())),
        };

        let sample = |reader: &CgroupReader| {
            reader.sample(pid).map_err(|e| match e {
                // The process exited between inspect and read.
                sandbox_cgroups::error::Error::Io { source, .. }
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    Error::NotRunning(id.to_string())
                }
                other => Error::Stats(other),
            })
        };

        let previous = sample(&self.cgroups)?;
        tokio::time::sleep(self.stats_interval).await;
        let current = sample(&self.cgroups)?;
        Ok(RawStats { previous, current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_config::{NetworkMode, RunAsUser};
    use sandbox_fs::{BindMount, TmpfsMount};
    use std::path::PathBuf;

    fn spec() -> ContainerSpec {
        let mut labels = BTreeMap::new();
        labels.insert("io.sbx.managed".to_string(), "true".to_string());
        ContainerSpec {
            name: "sbx-test".into(),
            image: "python@sha256:abc".into(),
            command: vec!["python3".into(), "-u".into(), "/sandbox/code/strategy.py".into()],
            labels,
            mounts: vec![BindMount::read_only("/tmp/sbx-code-1", "/sandbox/code")],
            tmpfs: vec![TmpfsMount {
                target: "/tmp".into(),
                size_bytes: 1024,
                options: "rw,noexec,nosuid".into(),
            }],
            read_only_root: true,
            network: NetworkMode::None,
            memory_bytes: 2048,
            memory_swap_bytes: 4096,
            cpus: 0.5,
            pids_limit: 64,
            user: RunAsUser { uid: 1000, gid: 1000 },
            seccomp_profile: Some(PathBuf::from("/etc/sbx/seccomp.json")),
            working_dir: None,
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_create_args_apply_every_restriction() {
        let args = create_args(&spec()).unwrap();
        assert_eq!(args[0], "create");
        assert!(args.contains(&"--pull=never".to_string()));
        assert!(args.contains(&"--init".to_string()));
        assert!(args.contains(&"--read-only".to_string()));
        assert!(has_pair(&args, "--cap-drop", "ALL"));
        assert!(has_pair(&args, "--security-opt", "no-new-privileges"));
        assert!(has_pair(&args, "--security-opt", "seccomp=/etc/sbx/seccomp.json"));
        assert!(has_pair(&args, "--network", "none"));
        assert!(has_pair(&args, "--memory", "2048"));
        assert!(has_pair(&args, "--memory-swap", "4096"));
        assert!(has_pair(&args, "--cpus", "0.5"));
        assert!(has_pair(&args, "--pids-limit", "64"));
        assert!(has_pair(&args, "--user", "1000:1000"));
        assert!(has_pair(&args, "--label", "io.sbx.managed=true"));
        assert!(has_pair(&args, "--tmpfs", "/tmp:rw,noexec,nosuid,size=1024"));
        assert!(has_pair(
            &args,
            "--mount",
            "type=bind,source=/tmp/sbx-code-1,target=/sandbox/code,readonly"
        ));

        // Image, then the command, close the argument list.
        let tail = &args[args.len() - 4..];
        assert_eq!(tail[0], "python@sha256:abc");
        assert_eq!(tail[3], "/sandbox/code/strategy.py");
    }

    #[test]
    fn test_create_args_without_profile_or_read_only() {
        let spec = ContainerSpec {
            seccomp_profile: None,
            read_only_root: false,
            ..spec()
        };
        let args = create_args(&spec).unwrap();
        assert!(!args.iter().any(|a| a.starts_with("seccomp=")));
        assert!(!args.contains(&"--read-only".to_string()));
        assert!(has_pair(&args, "--security-opt", "no-new-privileges"));
    }

    #[test]
    fn test_create_args_reject_empty_command() {
        let spec = ContainerSpec {
            command: Vec::new(),
            ..spec()
        };
        assert!(matches!(create_args(&spec), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn test_classify_failure() {
        let e = classify_failure("docker rm", Some(1), "Error: No such container: abc", "abc");
        assert!(matches!(e, Error::NotFound(id) if id == "abc"));

        let e = classify_failure(
            "docker create",
            Some(125),
            "Error response from daemon: No such image: python:3.11-slim",
            "python:3.11-slim",
        );
        assert!(matches!(e, Error::ImageNotFound(image) if image == "python:3.11-slim"));

        let e = classify_failure(
            "docker info",
            Some(1),
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
            "docker",
        );
        assert!(matches!(e, Error::DaemonUnavailable(_)));

        let e = classify_failure("docker kill", Some(1), "Error: container abc is not running", "abc");
        assert!(matches!(e, Error::NotRunning(_)));

        let e = classify_failure("docker start", Some(1), "oci runtime error", "abc");
        assert!(matches!(e, Error::CommandFailed { code: Some(1), .. }));
    }

    #[test]
    fn test_classify_missing_object_any_case() {
        for stderr in [
            "Error: No such object: abc",
            "Error: no such object: \"abc\"",
            "Error: no such container abc",
            "Error: inspecting object: no such container \"abc\"",
        ] {
            let e = classify_failure("podman inspect", Some(125), stderr, "abc");
            assert!(matches!(e, Error::NotFound(_)), "{} classified as {:?}", stderr, e);
        }
    }

    #[test]
    fn test_merge_timestamped_restores_order() {
        let stdout = "2026-10-18T09:30:05.1Z computing\n2026-10-18T09:30:05.3Z about to fail\n";
        let stderr = "2026-10-18T09:30:05.2Z warning: slow\n\
                      2026-10-18T09:30:05.4Z Traceback (most recent call last):\n\
                      2026-10-18T09:30:05.4Z ValueError: boom\n";

        assert_eq!(
            merge_timestamped(stdout, stderr),
            "computing\nwarning: slow\nabout to fail\nTraceback (most recent call last):\nValueError: boom\n"
        );
    }

    #[test]
    fn test_merge_timestamped_keeps_unstamped_lines() {
        let stdout = "2026-10-18T09:30:05.123456789Z first\nno prefix here\n2026-10-18T09:30:06Z last\n";
        assert_eq!(merge_timestamped(stdout, ""), "first\nno prefix here\nlast\n");
        assert_eq!(merge_timestamped("", ""), "");
    }

    #[test]
    fn test_parse_inspect_docker() {
        let stdout = r#"[{
            "Id": "0123abcd",
            "Created": "2024-03-01T10:00:00.123456789Z",
            "Name": "/sbx-1",
            "State": {"Status": "exited", "Running": false, "Pid": 0, "ExitCode": 3,
                      "OOMKilled": true, "FinishedAt": "2024-03-01T10:00:05Z"},
            "Config": {"Labels": {"io.sbx.managed": "true"}}
        }]"#;
        let info = parse_inspect(stdout).unwrap().unwrap();
        assert_eq!(info.id, "0123abcd");
        assert_eq!(info.name, "sbx-1");
        assert_eq!(info.status, ContainerStatus::Exited);
        assert_eq!(info.exit_code, Some(3));
        assert_eq!(info.pid, None);
        assert!(info.oom_killed);
        assert!(info.has_label("io.sbx.managed", "true"));
        assert!(info.created_at.is_some());
        assert!(info.finished_at.is_some());
    }

    #[test]
    fn test_parse_inspect_running_podman() {
        let stdout = r#"[{
            "Id": "ffee",
            "Name": "sbx-2",
            "State": {"Status": "running", "Pid": 4242, "ExitCode": 0,
                      "FinishedAt": "0001-01-01T00:00:00Z"},
            "Config": {"Labels": null}
        }]"#;
        let info = parse_inspect(stdout).unwrap().unwrap();
        assert_eq!(info.status, ContainerStatus::Running);
        assert_eq!(info.pid, Some(4242));
        assert_eq!(info.exit_code, None);
        assert_eq!(info.finished_at, None);
        assert!(info.labels.is_empty());

        assert_eq!(parse_inspect("[]").unwrap(), None);
        assert!(parse_inspect("not json").is_err());
    }

    #[test]
    fn test_parse_ps_rows() {
        let rows = parse_ps("aaa\t/sbx-1\texited\nbbb\tsbx-2\tcreated\n\nccc\tsbx-3\tstopped\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "sbx-1");
        assert_eq!(rows[1].status, ContainerStatus::Created);
        assert_eq!(rows[2].status, ContainerStatus::Exited);
        assert!(parse_ps("only-one-field").is_err());
    }

    #[test]
    fn test_ps_args_use_one_call() {
        let filter = ListFilter::default()
            .label("io.sbx.managed", "true")
            .statuses(&ContainerStatus::ORPHAN_STATUSES);
        let args = ps_args(&filter);
        assert!(has_pair(&args, "--filter", "label=io.sbx.managed=true"));
        assert!(has_pair(&args, "--filter", "status=exited"));
        assert!(has_pair(&args, "--filter", "status=dead"));
        assert!(has_pair(&args, "--filter", "status=created"));
    }
}
