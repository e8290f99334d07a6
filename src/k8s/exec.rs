//! One-shot command execution inside a pod (the `kubectl exec` equivalent)

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::ExecOutput;
use crate::error::{Error, Result};

/// Run `command` in `pod`, collect its stdout and report whether it exited 0.
///
/// The whole session, from the websocket upgrade to the exit status, is
/// bounded by `timeout`.
pub(super) async fn run_command(
    pods: &Api<Pod>,
    namespace: &str,
    pod: &str,
    command: Vec<String>,
    timeout: Duration,
) -> Result<ExecOutput> {
    let session = async {
        let ap = AttachParams {
            stdin: false,
            stdout: true,
            stderr: false,
            tty: false,
            ..Default::default()
        };

        let mut attached = pods
            .exec(pod, command, &ap)
            .await
            .map_err(|e| Error::exec(namespace, pod, e.to_string()))?;

        let mut stdout = String::new();
        if let Some(mut reader) = attached.stdout() {
            reader
                .read_to_string(&mut stdout)
                .await
                .map_err(|e| Error::exec(namespace, pod, format!("failed to read stdout: {}", e)))?;
        }

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        debug!(namespace, pod, ?status, "Exec completed");

        Ok::<_, Error>(ExecOutput {
            stdout,
            success: exited_successfully(status.as_ref()),
            exit_code: exit_code(status.as_ref()),
        })
    };

    match tokio::time::timeout(timeout, session).await {
        Ok(result) => result,
        Err(_) => {
            warn!(namespace, pod, ?timeout, "Exec session timed out");
            Err(Error::exec(
                namespace,
                pod,
                format!("session did not finish within {:?}", timeout),
            ))
        }
    }
}

/// The exec status channel reports `Success` only for a zero exit code
fn exited_successfully(status: Option<&Status>) -> bool {
    status.and_then(|s| s.status.as_deref()) == Some("Success")
}

/// Exit code of the command: 0 on success, otherwise the `ExitCode` cause
/// attached to a `NonZeroExitCode` failure
fn exit_code(status: Option<&Status>) -> Option<i32> {
    let status = status?;
    if exited_successfully(Some(status)) {
        return Some(0);
    }
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_deref()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    #[test]
    fn test_exit_status() {
        let success = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        let failure = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            ..Default::default()
        };

        assert!(exited_successfully(Some(&success)));
        assert!(!exited_successfully(Some(&failure)));
        assert!(!exited_successfully(None));
    }

    #[test]
    fn test_exit_code_from_status_details() {
        let not_found = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("127".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let success = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        let bare_failure = Status {
            status: Some("Failure".to_string()),
            ..Default::default()
        };

        assert_eq!(exit_code(Some(&not_found)), Some(127));
        assert_eq!(exit_code(Some(&success)), Some(0));
        assert_eq!(exit_code(Some(&bare_failure)), None);
        assert_eq!(exit_code(None), None);
    }
}
