//! Kernel fault handling against a scripted journal and init system.

mod common;

use std::time::Duration;

use common::{channel_journal, eventually, FixedInit};
use gpu_watchdog::actuator::restart_queue;
use gpu_watchdog::backends::JournalEntry;
use gpu_watchdog::observability::metrics::metric_sink;
use gpu_watchdog::sources::kernel::FaultOutcome;
use gpu_watchdog::sources::{FaultDetector, KernelWatcher};
use gpu_watchdog::{ServiceSet, Shutdown};

const XID_PYTHON: &str =
    "NVRM: Xid (PCI:0000:01:00): 43, pid=4242, name=python, Ch 00000008";

fn services() -> ServiceSet {
    ServiceSet::from_names(["sd", "upscaler"]).unwrap()
}

#[tokio::test]
async fn fault_on_active_unit_restarts_every_service() {
    let (journal_tx, journal) = channel_journal();
    let init = FixedInit::new("active");
    let (queue, mut rx) = restart_queue(10);
    let (sink, worker, handle) = metric_sink();
    let shutdown = Shutdown::new();
    tokio::spawn(worker.run(shutdown.subscribe()));

    let watcher = KernelWatcher::new(
        journal,
        init.clone(),
        services(),
        "sd.service",
        FaultDetector::default(),
        queue,
        sink,
    );
    let task = tokio::spawn(watcher.run(shutdown.subscribe()));

    journal_tx.send(JournalEntry::new("usb 1-1: new device")).unwrap();
    journal_tx.send(JournalEntry::new(XID_PYTHON)).unwrap();
    drop(journal_tx);
    task.await.unwrap();

    assert_eq!(rx.recv().await.unwrap().service, "sd");
    assert_eq!(rx.recv().await.unwrap().service, "upscaler");
    assert!(rx.try_recv().is_err());
    assert_eq!(init.queries(), ["sd.service"]);
    assert!(
        eventually(|| handle.render().contains(r#"restarts{reason="xid"} 1"#)).await,
        "{}",
        handle.render()
    );
}

#[tokio::test]
async fn fault_on_inactive_unit_is_ignored() {
    let (_journal_tx, journal) = channel_journal();
    let init = FixedInit::new("activating");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();

    let watcher = KernelWatcher::new(
        journal,
        init.clone(),
        services(),
        "sd.service",
        FaultDetector::default(),
        queue,
        sink,
    );

    let outcome = watcher.handle_entry(&JournalEntry::new(XID_PYTHON)).await;
    assert_eq!(outcome, FaultOutcome::Skipped("activating".into()));
    assert!(rx.try_recv().is_err());

    init.set_state("active");
    let outcome = watcher.handle_entry(&JournalEntry::new(XID_PYTHON)).await;
    assert_eq!(outcome, FaultOutcome::Restarted(2));
}

#[tokio::test]
async fn unrelated_entries_never_query_the_unit() {
    let (_journal_tx, journal) = channel_journal();
    let init = FixedInit::new("active");
    let (queue, mut rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();

    let watcher = KernelWatcher::new(
        journal,
        init.clone(),
        services(),
        "sd.service",
        FaultDetector::default(),
        queue,
        sink,
    );

    for message in [
        "NVRM: Xid (PCI:0000:01:00): 79, pid=900, name=Xorg",
        "python3[77]: segfault at 0",
        "",
    ] {
        assert_eq!(
            watcher.handle_entry(&JournalEntry::new(message)).await,
            FaultOutcome::NotAFault
        );
    }
    assert!(init.queries().is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn watcher_stops_on_shutdown_while_waiting() {
    let (_journal_tx, journal) = channel_journal();
    let (queue, _rx) = restart_queue(10);
    let (sink, _worker, _handle) = metric_sink();
    let shutdown = Shutdown::new();

    let watcher = KernelWatcher::new(
        journal,
        FixedInit::new("active"),
        services(),
        "sd.service",
        FaultDetector::default(),
        queue,
        sink,
    );
    let task = tokio::spawn(watcher.run(shutdown.subscribe()));

    tokio::task::yield_now().await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("kernel watcher did not stop")
        .unwrap();
}
