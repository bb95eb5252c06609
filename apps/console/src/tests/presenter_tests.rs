use super::*;
use agent_core::{Phase, StageStatus};
use serde_json::json;
use shared::error::FailureReport;

fn catalog() -> StageCatalog {
    StageCatalog::idoc_triage()
}

fn presenter() -> TerminalPresenter<Vec<u8>> {
    TerminalPresenter::new(Vec::new(), catalog())
}

fn text(presenter: &TerminalPresenter<Vec<u8>>) -> String {
    String::from_utf8(presenter.out.clone()).expect("utf8")
}

fn started() -> RunState {
    let mut state = RunState::idle(&catalog());
    state.run_id = Some(Uuid::new_v4());
    state.phase = Phase::Running;
    state.success_count = 5;
    state.failure_count = 2;
    state
}

fn record(value: Value) -> Record {
    Record::from_value(value).expect("record")
}

fn complete_all(state: &mut RunState) {
    for (slot, stage) in state.stages.iter_mut().zip(catalog().stages()) {
        slot.status = StageStatus::DONE;
        slot.output = Some(stage.static_result.clone());
    }
}

#[tokio::test]
async fn stage_heading_and_result_are_written_once() {
    let mut presenter = presenter();
    let mut state = started();
    state.stages[0].status = StageStatus::LOADING;

    presenter.render(&state).await;
    presenter.render(&state).await;
    let loading = text(&presenter);
    assert_eq!(loading.matches("## Main Category: Analysis").count(), 1);
    assert!(loading.contains("Running: main_ml_triage_agent_predict_tool"));
    assert!(!loading.contains("Total Success"));

    state.stages[0].status = StageStatus::DONE;
    state.stages[0].output = catalog().get(0).map(|stage| stage.static_result.clone());
    presenter.render(&state).await;
    presenter.render(&state).await;

    let done = text(&presenter);
    assert_eq!(done.matches("ML Predicted Main Category: Idoc Issue").count(), 1);
    assert!(done.contains("Total Success: 5   Total Error: 2"));
}

#[tokio::test]
async fn backlog_table_is_sorted_by_idoc_number() {
    let mut presenter = presenter();
    let mut state = started();
    state.backlog = vec![
        record(json!({"idoc_number": "0000100", "error_text": "Sales order not found"})),
        record(json!({"idoc_number": "0000020", "error_text": "Material blocked"})),
    ];
    complete_all(&mut state);
    state.phase = Phase::AwaitingDecision;

    presenter.render(&state).await;

    let out = text(&presenter);
    assert!(out.contains("Master Data Table: idoc_status"));
    assert!(out.contains("| IDOC NUMBER | ERROR TEXT"));
    let first = out.find("0000020").expect("second record");
    let second = out.find("0000100").expect("first record");
    assert!(first < second);
    assert!(out.contains("sync_idoc_with_sales"));
    assert!(out.contains("Similar Incident Found:"));
    assert!(out.contains("System/Client: SP1CLNT1/100"));
}

#[tokio::test]
async fn empty_backlog_shows_the_no_issues_card() {
    let mut presenter = presenter();
    let mut state = started();
    state.success_count = 5;
    state.failure_count = 0;
    state.empty_backlog = true;
    state.phase = Phase::Terminal;
    state.outcome = Some(Outcome::NoIssues);

    presenter.render(&state).await;
    presenter.render(&state).await;

    let out = text(&presenter);
    assert_eq!(out.matches("No IDOC Issues Found").count(), 1);
    assert!(out.contains("Total Success: 5"));
    assert!(out.contains("Total Error: 0"));
    assert!(!out.contains("##"));
}

#[tokio::test]
async fn decline_thanks_the_user() {
    let mut presenter = presenter();
    let mut state = started();
    complete_all(&mut state);
    state.phase = Phase::Terminal;
    state.outcome = Some(Outcome::Declined);

    presenter.render(&state).await;

    assert!(text(&presenter).contains("Thank you for choosing SAP Support!"));
}

#[tokio::test]
async fn reconciliation_lists_updates_and_updated_table() {
    let mut presenter = presenter();
    let mut state = started();
    complete_all(&mut state);
    state.phase = Phase::Terminal;
    state.outcome = Some(Outcome::Reconciled);
    state.reconciliation = serde_json::from_value(json!([{
        "idocNumber": "0000100",
        "updates": [
            {"field": "status", "value": "53", "oldValue": "51", "status": "updated"},
            {"field": "plant", "value": "1000", "status": "same"}
        ]
    }]))
    .expect("results");
    state.reconciled_backlog = vec![record(json!({"idocNumber": "0000100", "status": "53"}))];

    presenter.render(&state).await;

    let out = text(&presenter);
    assert!(out.contains("1. IDOC Number: 0000100"));
    assert!(out.contains("status: `53` (was updated to match from `51`)"));
    assert!(out.contains("plant: `1000` (matched)"));
    assert!(out.contains("Updated Master Data Table: idoc_status"));
    assert!(out.contains("| IDOCNUMBER | STATUS |"));
}

#[tokio::test]
async fn update_failure_is_reported_with_an_empty_table() {
    let mut presenter = presenter();
    let mut state = started();
    complete_all(&mut state);
    state.phase = Phase::Terminal;
    state.outcome = Some(Outcome::Reconciled);
    state
        .failures
        .push(FailureReport::new(FailureKind::UpdateFailure, "status 500"));

    presenter.render(&state).await;

    let out = text(&presenter);
    assert!(out.contains("Reprocessing failed: status 500"));
    assert!(out.contains("No data available"));
    assert!(!out.contains("successfully reconciled"));
}

#[tokio::test]
async fn preset_decision_answers_the_prompt() {
    let mut presenter = presenter().with_decision(Decision::Reprocess);

    let decision = presenter.choose(&started()).await;

    assert_eq!(decision, Decision::Reprocess);
    assert!(text(&presenter).contains("DO YOU WANT TO REPROCESS? [yes/no] yes"));
}

#[tokio::test]
async fn prompt_repeats_until_a_valid_answer() {
    let mut presenter = presenter().with_input(&b"maybe\n N \n"[..]);

    let decision = presenter.choose(&started()).await;

    assert_eq!(decision, Decision::Decline);
    assert!(text(&presenter).contains("Please answer yes or no:"));
}

#[tokio::test]
async fn closed_input_declines() {
    let mut presenter = presenter().with_input(&b""[..]);

    assert_eq!(presenter.choose(&started()).await, Decision::Decline);
}

#[tokio::test]
async fn a_new_run_is_drawn_from_the_top() {
    let mut presenter = presenter();
    let mut first = started();
    first.stages[0].status = StageStatus::LOADING;
    presenter.render(&first).await;

    let mut second = started();
    second.stages[0].status = StageStatus::LOADING;
    presenter.render(&second).await;

    assert_eq!(text(&presenter).matches("## Main Category: Analysis").count(), 2);
}
