use kaia::error::Error;
use kaia::executor::{KubectlExecutor, run_shell};
use kaia::tools::{KUBECTL_TOOL, LocalTools, ToolBackend, ToolOutcome};
use serde_json::json;

#[tokio::test]
async fn prefixes_binary_and_returns_stdout() {
    let exec = KubectlExecutor::new("echo");
    let out = exec.run("get pods -A").await.unwrap();
    assert_eq!(out, b"get pods -A\n");
}

#[tokio::test]
async fn does_not_double_prefix() {
    let exec = KubectlExecutor::new("echo");
    let out = exec.run("echo version").await.unwrap();
    assert_eq!(out, b"version\n");
}

#[tokio::test]
async fn empty_command_runs_binary_with_empty_argument() {
    let exec = KubectlExecutor::new("echo");
    let out = exec.run("").await.unwrap();
    assert_eq!(out, b"\n");
}

#[tokio::test]
async fn non_zero_exit_carries_status() {
    let exec = KubectlExecutor::new("false");
    let err = exec.run("get pods").await.unwrap_err();
    match err {
        Error::Command {
            program, exit_code, ..
        } => {
            assert_eq!(program, "false");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("expected command error, got {other:?}"),
    }
}

#[tokio::test]
async fn failure_output_includes_stderr() {
    let err = run_shell("ls /kaia-definitely-missing-path")
        .await
        .unwrap_err();
    match err {
        Error::Command {
            exit_code, output, ..
        } => {
            assert_ne!(exit_code, Some(0));
            assert!(
                output.contains("kaia-definitely-missing-path"),
                "stderr should be captured: {output}"
            );
        }
        other => panic!("expected command error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_is_io_error() {
    let exec = KubectlExecutor::new("kaia-no-such-binary");
    let err = exec.run("get pods").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn shell_runs_without_prefix() {
    let out = run_shell("echo one two").await.unwrap();
    assert_eq!(out, b"one two\n");
}

#[tokio::test]
async fn local_tool_wraps_stdout_as_success() {
    let tools = LocalTools::new(KubectlExecutor::new("echo"), false);
    let outcome = tools
        .call(KUBECTL_TOOL, &json!({"command": "get deployments"}))
        .await;
    assert_eq!(outcome, ToolOutcome::Success("get deployments\n".into()));
}

#[tokio::test]
async fn local_tool_turns_exit_failure_into_failure_outcome() {
    let tools = LocalTools::new(KubectlExecutor::new("false"), false);
    let outcome = tools.call(KUBECTL_TOOL, &json!({"command": "get pods"})).await;
    match outcome {
        ToolOutcome::Failure(reason) => {
            assert!(reason.contains("exit status 1"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
