// tests/report_flow.rs
// Report generation tests: trigger, failure and retry, background worker, recovery

mod common;

use common::{Harness, REPORT_HTML, harness, harness_with, opening};
use healthy::background::{ReportQueue, ReportWorker, recover_pending};
use healthy::db::ReportStatus;
use healthy::intake::SessionStatus;
use healthy::llm::{EffortLevel, Role};
use healthy::IntakeError;
use std::time::Duration;
use tokio::sync::watch;

/// Run a one-question intake through to handoff; returns the session id
async fn intake_to_handoff(h: &Harness, user_id: i64) -> i64 {
    let sid = h.service.start_session(user_id).await.unwrap().session_id;
    h.primary.reply(opening(1));
    h.service.handle_turn(sid, "我34岁，女，最近总是失眠").await.unwrap();
    let outcome = h.service.handle_turn(sid, "C").await.unwrap();
    assert!(outcome.is_handoff());
    sid
}

// ============================================================================
// Synchronous trigger
// ============================================================================

#[tokio::test]
async fn test_trigger_completes_report() {
    let h = harness().await;
    let sid = intake_to_handoff(&h, 1).await;

    h.primary.reply(REPORT_HTML);
    let report = h.service.trigger_report_generation(sid).await.unwrap();

    assert_eq!(report.status(), ReportStatus::Completed);
    assert_eq!(report.score, 82);
    assert_eq!(report.risk_level, "高");
    assert!(report.content.html.starts_with("<div"));
    assert!(!report.content.html.contains("```"));

    let session = h.store.get_session(sid).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);

    let request = h.primary.last_request();
    assert_eq!(request.thinking_level, Some(EffortLevel::High));
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[0].content.contains("睡眠健康"));
    assert!(request.messages[0].content.contains("女 34岁 长期失眠"));
    assert!(request.messages[0].content.contains("我34岁，女，最近总是失眠"));
    assert_eq!(request.messages[1].content, "请生成HTML报告");

    let summaries = h.service.list_reports(1).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].score, 82);
    assert_eq!(summaries[0].status, ReportStatus::Completed);
    assert_eq!(summaries[0].preview, "我34岁，女，最近总是失眠");
}

#[tokio::test]
async fn test_trigger_on_completed_report_is_noop() {
    let h = harness().await;
    let sid = intake_to_handoff(&h, 1).await;

    h.primary.reply(REPORT_HTML);
    let first = h.service.trigger_report_generation(sid).await.unwrap();
    let calls = h.primary.calls();

    let second = h.service.trigger_report_generation(sid).await.unwrap();
    assert_eq!(h.primary.calls(), calls);
    assert_eq!(second.id, first.id);
    assert_eq!(second.content.html, first.content.html);
}

#[tokio::test]
async fn test_trigger_before_handoff() {
    let h = harness().await;
    let sid = h.service.start_session(1).await.unwrap().session_id;

    // No track yet
    let err = h.service.trigger_report_generation(sid).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidStateTransition(_)));

    // Track locked but intake still running
    h.primary.reply(opening(5));
    h.service.handle_turn(sid, "失眠").await.unwrap();
    let err = h.service.trigger_report_generation(sid).await.unwrap_err();
    assert!(matches!(err, IntakeError::ReportNotFound(_)));

    let err = h.service.trigger_report_generation(999).await.unwrap_err();
    assert!(matches!(err, IntakeError::SessionNotFound(999)));
}

#[tokio::test]
async fn test_report_without_markers_is_unrated() {
    let h = harness().await;
    let sid = intake_to_handoff(&h, 1).await;

    h.primary.reply("<div><p>整体状况良好</p></div>");
    let report = h.service.trigger_report_generation(sid).await.unwrap();
    assert_eq!(report.status(), ReportStatus::Completed);
    assert_eq!(report.score, 0);
    assert_eq!(report.risk_level, "unrated");
}

#[tokio::test]
async fn test_styled_report_keeps_risk_level() {
    let h = harness().await;
    let sid = intake_to_handoff(&h, 1).await;

    h.primary.reply(
        r#"<html><head><style>
.score-value { font-size: 56px; color: #2a7; }
.risk-badge { border-radius: 8px; padding: 4px 12px; }
</style></head>
<body><div class="summary"><span class="score-value">78.6</span><span class="risk-badge risk-medium">中</span></div></body></html>"#,
    );
    let report = h.service.trigger_report_generation(sid).await.unwrap();
    assert_eq!(report.status(), ReportStatus::Completed);
    assert_eq!(report.score, 79);
    assert_eq!(report.risk_level, "中");
}

// ============================================================================
// Failure and retry
// ============================================================================

#[tokio::test]
async fn test_failed_report_can_be_retried() {
    let h = harness().await;
    let sid = intake_to_handoff(&h, 1).await;

    // Empty script: primary and secondary both fail
    let failed = h.service.trigger_report_generation(sid).await.unwrap();
    assert_eq!(failed.status(), ReportStatus::Error);
    assert!(failed.content.error.is_some());

    let session = h.store.get_session(sid).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::GeneratingReport);

    let request = h.secondary.last_request();
    assert_eq!(request.model, "deepseek-reasoner");
    assert!(request.temperature.is_none());

    h.primary.reply(REPORT_HTML);
    let retried = h.service.trigger_report_generation(sid).await.unwrap();
    assert_eq!(retried.id, failed.id);
    assert_eq!(retried.status(), ReportStatus::Completed);
    assert!(retried.content.error.is_none());

    let session = h.store.get_session(sid).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

// ============================================================================
// Background worker
// ============================================================================

#[tokio::test]
async fn test_worker_generates_queued_report() {
    let (queue, rx) = ReportQueue::channel();
    let h = harness_with(|service| service.with_queue(queue)).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReportWorker::new(h.service.generator(), h.service.locks(), rx, shutdown_rx);
    let handle = tokio::spawn(worker.run());

    // Scripted before the handoff so the worker finds its reply
    let sid = h.service.start_session(1).await.unwrap().session_id;
    h.primary.reply(opening(1));
    h.service.handle_turn(sid, "失眠").await.unwrap();
    h.primary.reply(REPORT_HTML);
    assert!(h.service.handle_turn(sid, "A").await.unwrap().is_handoff());

    let report = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let report = h.service.get_report(sid).await.unwrap();
            if report.is_completed() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("worker should finish the report");
    assert_eq!(report.score, 82);

    shutdown_tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), 1);
}

#[tokio::test]
async fn test_recover_pending_requeues_generating_reports() {
    let h = harness().await;
    let pending = intake_to_handoff(&h, 1).await;
    let done = intake_to_handoff(&h, 2).await;
    h.primary.reply(REPORT_HTML);
    h.service.trigger_report_generation(done).await.unwrap();

    let (queue, mut rx) = ReportQueue::channel();
    let count = recover_pending(h.store.as_ref(), &queue).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(rx.recv().await, Some(pending));
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let h = harness().await;
    let (_queue, rx) = ReportQueue::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReportWorker::new(h.service.generator(), h.service.locks(), rx, shutdown_rx);
    let handle = tokio::spawn(worker.run());

    shutdown_tx.send(true).unwrap();
    let processed = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(processed, 0);
}
