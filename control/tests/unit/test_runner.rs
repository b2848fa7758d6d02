//! Process runner and concurrency gate tests

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_test::assert_ok;

use stackctl::errors::RunError;
use stackctl::runner::{CommandRequest, ConcurrencyGate, ProcessRunner, RunOptions, RunnerOptions};

fn runner(max_parallel: usize) -> ProcessRunner {
    ProcessRunner::new(RunnerOptions {
        max_parallel,
        default_timeout: Duration::from_secs(10),
        working_dir: std::env::temp_dir(),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_capacity() {
    let runner = runner(2);

    let runs = (0..6).map(|_| runner.execute(CommandRequest::new("sleep").arg("0.2")));
    let results = join_all(runs).await;

    for result in results {
        assert!(assert_ok!(result).success());
    }
    assert_eq!(runner.gate().peak(), 2);
    assert_eq!(runner.gate().in_flight(), 0);
}

#[tokio::test]
async fn test_gate_grants_permits_in_fifo_order() {
    let gate = Arc::new(ConcurrencyGate::new(1));
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = gate.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for i in 0..5 {
        let gate = gate.clone();
        let order = order.clone();
        waiters.push(tokio::spawn(async move {
            let _permit = gate.acquire().await.unwrap();
            order.lock().unwrap().push(i);
        }));
        // Let the waiter reach the semaphore queue before the next one
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    drop(held);
    for waiter in waiters {
        waiter.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(gate.peak(), 1);
}

#[tokio::test]
async fn test_timeout_is_distinct_from_exit_code() {
    let runner = runner(2);

    let timed_out = runner
        .execute(
            CommandRequest::new("sleep")
                .arg("5")
                .timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    assert!(timed_out.timed_out);
    assert!(!timed_out.success());

    let failed = runner
        .execute(CommandRequest::new("sh").args(["-c", "exit 3"]))
        .await
        .unwrap();
    assert!(!failed.timed_out);
    assert_eq!(failed.exit_code, 3);

    let err = runner
        .run(
            "sleep",
            ["5"],
            RunOptions {
                timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Timeout { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_wait_does_not_count_against_timeout() {
    let runner = Arc::new(runner(1));

    let busy = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.execute(CommandRequest::new("sleep").arg("0.4")).await })
    };
    while runner.gate().in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = Instant::now();
    let queued = runner
        .execute(
            CommandRequest::new("true").timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!queued.timed_out);
    assert!(queued.success());
    assert!(busy.await.unwrap().unwrap().success());
}

#[tokio::test]
async fn test_missing_program_is_not_found() {
    let err = runner(1)
        .run("definitely-not-a-real-binary", Vec::<String>::new(), RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::NotFound { .. }));
    assert_eq!(err.program(), "definitely-not-a-real-binary");
}

#[tokio::test]
async fn test_output_captured_on_failure() {
    let err = runner(1)
        .run(
            "sh",
            ["-c", "echo partial; echo boom >&2; exit 2"],
            RunOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        RunError::NonZeroExit { code, output, .. } => {
            assert_eq!(code, 2);
            assert_eq!(output, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
