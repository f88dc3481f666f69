#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::{TempDir, tempdir};

use syncjob::config::load_from_path;
use syncjob::config::model::JobConfig;
use syncjob::engine::{Orchestrator, RunContext, RunStatus};

type TestResult = Result<(), Box<dyn Error>>;

/// Stand-in for the external tool: appends its final argument (the
/// destination target) to an invocation log, fails when that target
/// contains "fail", and otherwise prints the summary lines the supervisor
/// scans for.
fn write_fake_tool(dir: &Path) -> Result<String, Box<dyn Error>> {
    let log = dir.join("invocations.log");
    let script = dir.join("fake-tool.sh");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\n\
             dest=\"\"\n\
             for a in \"$@\"; do dest=\"$a\"; done\n\
             echo \"$dest\" >> {log:?}\n\
             case \"$dest\" in *fail*) echo boom >&2; exit 1;; esac\n\
             echo 'Number of files transferred: 3'\n\
             echo 'sent 1000 bytes  received 20 bytes'\n"
        ),
    )?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    Ok(script.to_string_lossy().into_owned())
}

fn invocations(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("invocations.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn load_job(dir: &TempDir, toml: &str) -> Result<JobConfig, Box<dyn Error>> {
    let path = dir.path().join("Syncjob.toml");
    fs::write(&path, toml)?;
    let cfg = load_from_path(&path)?;
    Ok(cfg.job.values().next().cloned().expect("one job"))
}

fn ctx(tool_path: &str) -> RunContext {
    RunContext {
        tool_path: tool_path.to_string(),
        dry_run: false,
    }
}

#[tokio::test]
async fn all_destinations_succeeding_merges_to_success() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]

        [[job.t.destinations]]
        path = "/mnt/one"
        [[job.t.destinations]]
        path = "/mnt/two"
        [[job.t.destinations]]
        path = "/mnt/three"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.files_transferred, 9);
    assert_eq!(result.bytes_transferred, 3000);
    assert!(result.errors.is_empty());
    assert_eq!(invocations(dir.path()).len(), 3);
    Ok(())
}

#[tokio::test]
async fn stop_policy_halts_after_first_failed_destination() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]
        failure_policy = "stop"

        [[job.t.destinations]]
        path = "/mnt/good"
        [[job.t.destinations]]
        path = "/mnt/fail-here"
        [[job.t.destinations]]
        path = "/mnt/never-reached"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::PartialSuccess);
    // One error for the failed destination and one for the halted remainder.
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].contains("fail-here"));
    assert!(result.errors[1].contains("skipped"));

    let log = invocations(dir.path());
    assert_eq!(log.len(), 2);
    assert!(!log.iter().any(|l| l.contains("never-reached")));
    Ok(())
}

#[tokio::test]
async fn continue_policy_attempts_every_destination() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]
        failure_policy = "continue"

        [[job.t.destinations]]
        path = "/mnt/good"
        [[job.t.destinations]]
        path = "/mnt/fail-here"
        [[job.t.destinations]]
        path = "/mnt/also-good"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::PartialSuccess);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.files_transferred, 6);
    assert_eq!(invocations(dir.path()).len(), 3);
    Ok(())
}

#[tokio::test]
async fn every_destination_failing_merges_to_failed() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]

        [[job.t.destinations]]
        path = "/mnt/fail-a"
        [[job.t.destinations]]
        path = "/mnt/fail-b"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.files_transferred, 0);
    Ok(())
}

#[tokio::test]
async fn parallel_strategy_attempts_all_units() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]
        strategy = "parallel"
        max_concurrency = 2

        [[job.t.destinations]]
        path = "/mnt/one"
        [[job.t.destinations]]
        path = "/mnt/two"
        [[job.t.destinations]]
        path = "/mnt/three"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.files_transferred, 9);
    assert_eq!(invocations(dir.path()).len(), 3);
    Ok(())
}

#[tokio::test]
async fn full_mesh_crosses_sources_with_destinations() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data/a", "/data/b"]
        sync_mode = "full_mesh"

        [[job.t.destinations]]
        path = "/mnt/one"
        [[job.t.destinations]]
        path = "/mnt/two"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(invocations(dir.path()).len(), 4);
    Ok(())
}

#[tokio::test]
async fn fan_in_targets_only_the_primary_destination() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data/a", "/data/b", "/data/c"]
        sync_mode = "fan_in"

        [[job.t.destinations]]
        path = "/mnt/primary"
        [[job.t.destinations]]
        path = "/mnt/ignored"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    let log = invocations(dir.path());
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|l| l.contains("primary")));
    Ok(())
}

#[tokio::test]
async fn disabled_destinations_are_never_attempted() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]

        [[job.t.destinations]]
        path = "/mnt/active"
        [[job.t.destinations]]
        path = "/mnt/dormant"
        enabled = false
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    let log = invocations(dir.path());
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("active"));
    Ok(())
}

#[tokio::test]
async fn combined_output_is_labelled_per_destination() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]

        [[job.t.destinations]]
        path = "/mnt/one"
        [[job.t.destinations]]
        path = "/mnt/two"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert!(result.output.contains("=== /mnt/one ==="));
    assert!(result.output.contains("=== /mnt/two ==="));
    Ok(())
}

#[tokio::test]
async fn hooks_receive_job_context_through_the_environment() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let pre_marker = dir.path().join("pre.txt");
    let post_marker = dir.path().join("post.txt");

    let job = load_job(
        &dir,
        &format!(
            r#"
            [job.t]
            name = "Nightly Backup"
            sources = ["/data"]
            pre_hook = 'printf "%s" "$SYNCJOB_STATUS" > {pre}'
            post_hook = 'printf "%s %s %s" "$SYNCJOB_JOB_NAME" "$SYNCJOB_STATUS" "$SYNCJOB_FILES" > {post}'

            [[job.t.destinations]]
            path = "/mnt/one"
            "#,
            pre = pre_marker.display(),
            post = post_marker.display(),
        ),
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(fs::read_to_string(&pre_marker)?, "started");
    assert_eq!(
        fs::read_to_string(&post_marker)?,
        "Nightly Backup success 3"
    );
    Ok(())
}

#[tokio::test]
async fn failed_hook_is_recorded_but_does_not_abort_the_run() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = ["/data"]
        pre_hook = "exit 3"

        [[job.t.destinations]]
        path = "/mnt/one"
        "#,
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("pre-hook:"));
    Ok(())
}

#[tokio::test]
async fn dry_run_skips_hooks_and_passes_the_flag_through() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let marker = dir.path().join("hook-ran.txt");

    let job = load_job(
        &dir,
        &format!(
            r#"
            [job.t]
            sources = ["/data"]
            pre_hook = "touch {marker}"

            [[job.t.destinations]]
            path = "/mnt/one"
            "#,
            marker = marker.display(),
        ),
    )?;

    let context = RunContext {
        tool_path: tool.clone(),
        dry_run: true,
    };
    let result = Orchestrator::new().run_job("t", &job, &context).await?;

    assert_eq!(result.status, RunStatus::Success);
    assert!(!marker.exists());
    assert_eq!(invocations(dir.path()).len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_job_is_rejected_before_any_invocation() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;
    let job = load_job(
        &dir,
        r#"
        [job.t]
        sources = []

        [[job.t.destinations]]
        path = "/mnt/one"
        "#,
    )?;

    let err = Orchestrator::new()
        .run_job("t", &job, &ctx(&tool))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        syncjob::errors::EngineError::InvalidConfiguration(_)
    ));
    assert!(invocations(dir.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn partitioned_job_runs_one_invocation_per_batch() -> TestResult {
    let dir = tempdir()?;
    let tool = write_fake_tool(dir.path())?;

    let source = dir.path().join("src-tree");
    fs::create_dir_all(&source)?;
    for i in 0..6 {
        fs::write(source.join(format!("file{i}.txt")), "x")?;
    }

    let job = load_job(
        &dir,
        &format!(
            r#"
            [job.t]
            sources = [{src:?}]

            [[job.t.destinations]]
            path = "/mnt/one"

            [job.t.parallelism]
            enabled = true
            thread_count = 3
            "#,
            src = source.to_str().unwrap(),
        ),
    )?;

    let result = Orchestrator::new().run_job("t", &job, &ctx(&tool)).await?;

    assert_eq!(result.status, RunStatus::Success);
    // Three batches of the single destination.
    assert_eq!(invocations(dir.path()).len(), 3);
    Ok(())
}
