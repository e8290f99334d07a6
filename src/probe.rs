//! Reachability probes run from inside a source pod

use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::warn;

use crate::config::ProbeConfig;
use crate::k8s::{ExecOutput, RemoteExec};
use crate::models::Workload;

/// HTTP status a probe must observe to count as reachable
pub const SUCCESS_STATUS: &str = "200";

/// Shell exit codes for a command that exists but cannot be executed (126)
/// or cannot be found (127)
const COMMAND_NOT_RUNNABLE: [i32; 2] = [126, 127];

/// Outcome of one (source, destination) cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeResult {
    /// The fetch completed in time with HTTP 200
    Reachable,
    /// Any other status, a curl timeout or a transport error
    Unreachable,
    /// The probe could not be carried out at all
    Error(String),
    /// Source and destination are the same workload
    Skipped,
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProbeResult::Error(_))
    }
}

/// Runs `curl` inside source pods through a [`RemoteExec`]
pub struct Prober<'a, E: RemoteExec + ?Sized> {
    exec: &'a E,
    settings: ProbeConfig,
}

impl<'a, E: RemoteExec + ?Sized> Prober<'a, E> {
    pub fn new(exec: &'a E, settings: ProbeConfig) -> Self {
        Self { exec, settings }
    }

    pub fn settings(&self) -> &ProbeConfig {
        &self.settings
    }

    /// curl invocation for `target`.
    ///
    /// Without identity verification only the status code is printed; with it
    /// the body comes first and the status code sits on the last line.
    pub fn command(&self, target: Ipv4Addr) -> Vec<String> {
        let url = format!("http://{}:{}", target, self.settings.port);
        let timeout = self.settings.timeout_secs.to_string();

        let mut command = vec!["curl".to_string(), "-m".to_string(), timeout, "-s".to_string()];
        if self.settings.verify_identity {
            command.extend(["-w".to_string(), "\\n%{http_code}".to_string()]);
        } else {
            command.extend([
                "-o".to_string(),
                "/dev/null".to_string(),
                "-w".to_string(),
                "%{http_code}".to_string(),
            ]);
        }
        command.push(url);
        command
    }

    /// Probe `target` from inside `source`.
    ///
    /// `expected_identity` is only honoured when identity verification is
    /// enabled.
    pub async fn probe(
        &self,
        source: &Workload,
        target: Ipv4Addr,
        expected_identity: Option<&str>,
    ) -> ProbeResult {
        let result = self
            .exec
            .exec(
                source.cluster(),
                source.namespace(),
                source.name(),
                self.command(target),
                self.settings.session_timeout(),
            )
            .await;

        match result {
            Ok(output) => {
                let expected = expected_identity.filter(|_| self.settings.verify_identity);
                classify(&output, self.settings.verify_identity, expected)
            }
            Err(e) => {
                warn!(source = %source.id, target = %target, error = %e, "Probe could not run");
                ProbeResult::Error(e.to_string())
            }
        }
    }
}

/// Turn the output of the curl command into a probe outcome
pub fn classify(
    output: &ExecOutput,
    with_body: bool,
    expected_identity: Option<&str>,
) -> ProbeResult {
    if let Some(code) = output.exit_code.filter(|c| COMMAND_NOT_RUNNABLE.contains(c)) {
        return ProbeResult::Error(format!("curl could not run in the source pod (exit code {})", code));
    }
    if !output.success {
        return ProbeResult::Unreachable;
    }

    let (body, status) = if with_body {
        match output.stdout.rsplit_once('\n') {
            Some((body, status)) => (body, status.trim()),
            None => ("", output.stdout.trim()),
        }
    } else {
        ("", output.stdout.trim())
    };

    if status != SUCCESS_STATUS {
        return ProbeResult::Unreachable;
    }

    // the echo target ends its greeting with the name of the answering pod
    let answered_by = body.split_whitespace().last();
    match expected_identity {
        Some(identity) if answered_by != Some(identity) => {
            warn!(
                expected = identity,
                answered_by = answered_by.unwrap_or_default(),
                "Response came from a different workload"
            );
            ProbeResult::Unreachable
        }
        _ => ProbeResult::Reachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::k8s::MockRemoteExec;
    use crate::models::WorkloadAddress;
    use std::time::Duration;

    fn source() -> Workload {
        Workload::pod(
            "rome",
            "consumer-local",
            "po1",
            WorkloadAddress::Resolved(Ipv4Addr::new(10, 1, 2, 3)),
        )
    }

    fn output(stdout: &str, success: bool) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            success,
            exit_code: Some(if success { 0 } else { 28 }),
        }
    }

    #[test]
    fn test_command() {
        let exec = MockRemoteExec::new();
        let prober = Prober::new(&exec, ProbeConfig::default());
        assert_eq!(
            prober.command(Ipv4Addr::new(10, 5, 9, 9)),
            vec![
                "curl",
                "-m",
                "1",
                "-s",
                "-o",
                "/dev/null",
                "-w",
                "%{http_code}",
                "http://10.5.9.9:80"
            ]
        );
    }

    #[test]
    fn test_command_with_identity() {
        let exec = MockRemoteExec::new();
        let settings = ProbeConfig {
            verify_identity: true,
            port: 8080,
            ..ProbeConfig::default()
        };
        let command = Prober::new(&exec, settings).command(Ipv4Addr::new(10, 5, 9, 9));
        assert!(!command.contains(&"/dev/null".to_string()));
        assert_eq!(command.last().unwrap(), "http://10.5.9.9:8080");
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(classify(&output("200", true), false, None), ProbeResult::Reachable);
        assert_eq!(classify(&output("403", true), false, None), ProbeResult::Unreachable);
        assert_eq!(classify(&output("000", false), false, None), ProbeResult::Unreachable);
        // 200 but curl gave up before the transfer finished
        assert_eq!(classify(&output("200", false), false, None), ProbeResult::Unreachable);
    }

    #[test]
    fn test_classify_identity() {
        let good = output("Hello from po2\n200", true);
        let wrong = output("Hello from po7\n200", true);

        assert_eq!(classify(&good, true, Some("po2")), ProbeResult::Reachable);
        assert_eq!(classify(&wrong, true, Some("po2")), ProbeResult::Unreachable);
        // services have no single backend to check
        assert_eq!(classify(&wrong, true, None), ProbeResult::Reachable);
    }

    #[test]
    fn test_classify_identity_needs_exact_name() {
        let longer = output("Hello from po10\n200", true);
        let suffixed = output("Hello from po1-canary\n200", true);

        assert_eq!(classify(&longer, true, Some("po1")), ProbeResult::Unreachable);
        assert_eq!(classify(&suffixed, true, Some("po1")), ProbeResult::Unreachable);
        assert_eq!(
            classify(&output("Hello from po1\n200", true), true, Some("po1")),
            ProbeResult::Reachable
        );
    }

    #[test]
    fn test_missing_curl_is_an_error() {
        for code in [126, 127] {
            let missing = ExecOutput {
                stdout: String::new(),
                success: false,
                exit_code: Some(code),
            };
            assert!(classify(&missing, false, None).is_error());
        }
        // curl ran and gave up: exit 28 is an operation timeout
        assert_eq!(classify(&output("000", false), false, None), ProbeResult::Unreachable);
    }

    #[tokio::test]
    async fn test_probe_runs_in_source_pod() {
        let mut exec = MockRemoteExec::new();
        exec.expect_exec()
            .withf(|cluster, namespace, pod, command, timeout| {
                cluster == "rome"
                    && namespace == "consumer-local"
                    && pod == "po1"
                    && command.last().map(String::as_str) == Some("http://10.5.9.9:80")
                    && *timeout == Duration::from_secs(6)
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(output("200", true)));

        let prober = Prober::new(&exec, ProbeConfig::default());
        let result = prober.probe(&source(), Ipv4Addr::new(10, 5, 9, 9), None).await;
        assert_eq!(result, ProbeResult::Reachable);
    }

    #[tokio::test]
    async fn test_exec_failure_is_an_error() {
        let mut exec = MockRemoteExec::new();
        exec.expect_exec().returning(|_, namespace, pod, _, _| {
            Err(Error::exec(namespace, pod, "container not found"))
        });

        let prober = Prober::new(&exec, ProbeConfig::default());
        let result = prober.probe(&source(), Ipv4Addr::new(10, 1, 2, 4), None).await;
        assert!(result.is_error());
    }

    #[test]
    fn test_result_display() {
        assert_eq!(ProbeResult::Reachable.to_string(), "reachable");
        assert_eq!(ProbeResult::Error("x".to_string()).to_string(), "error");
    }
}
