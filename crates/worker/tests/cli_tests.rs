//! Positional invocation parsing.

use std::path::Path;

use assert_matches::assert_matches;
use clap::Parser;
use comfygen_core::{CoreError, WorkflowVariant};
use comfygen_worker::cli::Invocation;

fn args(extra: &[&str]) -> Vec<String> {
    let mut all = vec![
        "comfygen-worker",
        "req-1",
        "user-1",
        "chan-1",
        "inter-1",
        "msg-1",
    ];
    all.extend_from_slice(extra);
    all.into_iter().map(String::from).collect()
}

#[test]
fn standard_invocation_without_seed() {
    let inv = Invocation::try_parse_from(args(&[
        "standard",
        "a cat",
        "1:1",
        "[]",
        "2",
        "temp_workflow_req-1.json",
    ]))
    .unwrap();
    let request = inv.into_request().unwrap();

    assert_eq!(request.request_id, "req-1");
    assert_eq!(request.variant, WorkflowVariant::Standard);
    assert_eq!(request.prompt, "a cat");
    assert_eq!(request.resolution, "1:1");
    assert!(request.loras.is_empty());
    assert_eq!(request.upscale_factor, 2);
    assert_eq!(request.seed, None);
    assert_eq!(request.workflow_template, Path::new("temp_workflow_req-1.json"));
}

#[test]
fn redux_invocation_with_seed_and_loras() {
    let inv = Invocation::try_parse_from(args(&[
        "REDUX",
        "",
        "16:9",
        r#"["detail.safetensors"]"#,
        "1",
        "redux.json",
        "12345",
    ]))
    .unwrap();
    let request = inv.into_request().unwrap();

    assert_eq!(request.variant, WorkflowVariant::Redux);
    assert_eq!(request.loras, ["detail.safetensors"]);
    assert_eq!(request.seed.as_deref(), Some("12345"));
}

#[test]
fn prompt_and_seed_may_start_with_a_hyphen() {
    let inv = Invocation::try_parse_from(args(&[
        "pulid",
        "-moody portrait",
        "3:4",
        "[]",
        "4",
        "pulid.json",
        "-1",
    ]))
    .unwrap();
    assert_eq!(inv.prompt, "-moody portrait");
    assert_eq!(inv.seed.as_deref(), Some("-1"));
}

#[test]
fn unknown_request_type_is_rejected() {
    let result = Invocation::try_parse_from(args(&[
        "sketch", "a cat", "1:1", "[]", "2", "w.json",
    ]));
    assert!(result.is_err());
}

#[test]
fn missing_arguments_are_rejected() {
    assert!(Invocation::try_parse_from(args(&["standard", "a cat"])).is_err());
}

#[test]
fn malformed_lora_list_fails_request_construction() {
    let inv = Invocation::try_parse_from(args(&[
        "video", "a cat", "1:1", "not-json", "2", "w.json",
    ]))
    .unwrap();
    assert_matches!(inv.into_request(), Err(CoreError::Validation(_)));
}
