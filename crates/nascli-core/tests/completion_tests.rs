mod common;

use common::Harness;
use nascli_core::complete::{Candidate, CandidateKind};

fn texts(candidates: &[Candidate], kind: CandidateKind) -> Vec<&str> {
    candidates
        .iter()
        .filter(|c| c.kind == kind)
        .map(|c| c.text.as_str())
        .collect()
}

#[tokio::test]
async fn test_children_first() {
    let h = Harness::new().await;
    let candidates = h.session.complete("sto").await;
    assert_eq!(candidates[0].text, "storage");
    assert_eq!(candidates[0].kind, CandidateKind::Child);
}

#[tokio::test]
async fn test_completes_along_a_path() {
    let h = Harness::new().await;
    h.backend.reset();
    let candidates = h.session.complete("storage vo").await;
    assert_eq!(candidates[0].text, "volume");
    assert_eq!(h.backend.listings(), 1);
}

#[tokio::test]
async fn test_groups_in_order() {
    let h = Harness::new().await;
    let candidates = h.session.complete("storage volume ").await;
    let kinds: Vec<CandidateKind> = candidates.iter().map(|c| c.kind).collect();
    let first_command = kinds.iter().position(|k| *k == CandidateKind::Command).unwrap();
    assert!(kinds[..first_command].iter().all(|k| *k == CandidateKind::Child));
    assert_eq!(first_command, 3);
    // no keywords after the first word
    assert!(texts(&candidates, CandidateKind::Keyword).is_empty());
    assert!(texts(&candidates, CandidateKind::Command).contains(&"create"));
}

#[tokio::test]
async fn test_slash_paths() {
    let h = Harness::new().await;
    let candidates = h.session.complete("/net").await;
    assert_eq!(texts(&candidates, CandidateKind::Child), vec!["/network"]);
    assert!(texts(&candidates, CandidateKind::Command).is_empty());

    let candidates = h.session.complete("/storage/").await;
    assert_eq!(texts(&candidates, CandidateKind::Child), vec!["/storage/volume"]);
}

#[tokio::test]
async fn test_commands_of_current_namespace() {
    let mut h = Harness::new().await;
    h.ok("storage volume").await;
    let candidates = h.session.complete("cr").await;
    assert_eq!(candidates[0].text, "create");
    assert_eq!(candidates[0].kind, CandidateKind::Command);
    assert_eq!(candidates[0].description, "Create a volume");
}

#[tokio::test]
async fn test_property_names_after_set_and_get() {
    let mut h = Harness::new().await;
    h.ok("storage volume").await;

    let candidates = h.session.complete("tank set co").await;
    assert_eq!(candidates[0].text, "compression=");
    assert_eq!(candidates[0].kind, CandidateKind::Property);
    // read-only properties cannot be set
    let candidates = h.session.complete("tank set ").await;
    assert!(!texts(&candidates, CandidateKind::Property).contains(&"status="));

    let candidates = h.session.complete("tank get st").await;
    assert_eq!(candidates[0].text, "status");
}

#[tokio::test]
async fn test_pipeline_stages() {
    let h = Harness::new().await;
    let candidates = h.session.complete("storage volume show | so").await;
    assert_eq!(candidates[0].text, "sort");
    assert!(h.session.complete("storage volume show | sort na").await.is_empty());
}

#[tokio::test]
async fn test_keywords_and_functions_at_line_start() {
    let h = Harness::new().await;
    let candidates = h.session.complete("whi").await;
    assert!(texts(&candidates, CandidateKind::Keyword).contains(&"while"));
    let candidates = h.session.complete("x = 1; fact").await;
    assert_eq!(texts(&candidates, CandidateKind::Keyword), vec!["factorial("]);
}

#[tokio::test]
async fn test_never_fails() {
    let h = Harness::new().await;
    assert!(h.session.complete("print(\"sto").await.is_empty());
    let candidates = h.session.complete("nowhere ").await;
    assert!(texts(&candidates, CandidateKind::Child).is_empty());
    assert!(h.session.complete("- ").await.is_empty());
    assert!(h.session.complete("").await.len() > 3);
}
