//! Literal scenarios from spec.md §8, exercised end to end through the
//! public `Document`/`Engine` façade.

use assert_matches::assert_matches;
use weave::document::{Document, Engine};
use weave::error::WeaveError;
use weave::value::Value;

fn weave_one(yaml: &str) -> weave::document::WeaveOutcome {
    let doc = Document::parse_yaml(yaml).unwrap();
    Engine::new().weave(vec![doc]).unwrap()
}

fn get<'a>(outcome: &'a weave::document::WeaveOutcome, path: &str) -> &'a Value {
    weave::document::resolve(&outcome.document, path).unwrap()
}

#[test]
fn s1_simple_grab_with_fallback() {
    let outcome = weave_one(
        "meta:\n  env: prod\ndomain: (( grab meta.domain || \"default-domain\" ))\nenv: (( grab meta.env || \"sandbox\" ))\n",
    );
    assert_eq!(get(&outcome, "domain").as_str(), Some("default-domain"));
    assert_eq!(get(&outcome, "env").as_str(), Some("prod"));
}

#[test]
fn s2_concat_with_reference_and_escape() {
    let outcome = weave_one("test: \"\"\nnl: (( concat test \"a\\nb\" ))\n");
    assert_eq!(get(&outcome, "nl").as_str(), Some("a\nb"));
}

#[test]
fn s3_inject_with_call_site_override() {
    let outcome = weave_one(
        "meta:\n  template:\n    foo: FOO\n    bar: BAR\nexample:\n  overlay: (( inject meta.template ))\n  foo: foooo\n",
    );
    let example = get(&outcome, "example").as_mapping().unwrap();
    assert!(!example.contains_key(&weave::value::ScalarKey::String("overlay".into())));
    assert_eq!(get(&outcome, "example.foo").as_str(), Some("foooo"));
    assert_eq!(get(&outcome, "example.bar").as_str(), Some("BAR"));
}

#[test]
fn s4_array_merge_by_key() {
    let a = Document::parse_yaml("jobs:\n  - name: web\n    props:\n      foo: bar\n").unwrap();
    let b = Document::parse_yaml("jobs:\n  - name: web\n    props:\n      bar: baz\n").unwrap();
    let outcome = Engine::new().weave(vec![a, b]).unwrap();
    let props = weave::document::resolve(&outcome.document, "jobs.web.props").unwrap();
    let props = props.as_mapping().unwrap();
    assert_eq!(props.get(&weave::value::ScalarKey::String("foo".into())).unwrap().as_str(), Some("bar"));
    assert_eq!(props.get(&weave::value::ScalarKey::String("bar".into())).unwrap().as_str(), Some("baz"));
}

#[test]
fn s5_cycle_is_detected() {
    let doc = Document::parse_yaml("a: (( grab b ))\nb: (( grab c ))\nc: (( grab a ))\n").unwrap();
    let err = Engine::new().weave(vec![doc]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains('a') && message.contains('b') && message.contains('c'));
    assert_matches!(err, WeaveError::Cycle(_));
}

#[test]
fn s6_prune_metadata_propagates_through_evaluation() {
    // The merger preserves `meta.secret`'s prior content across the
    // overlay's `(( prune ))` so `grab` can still see it during
    // evaluation; only post-processing actually removes it.
    let base = Document::parse_yaml("meta:\n  secret:\n    inner: shh\n").unwrap();
    let overlay = Document::parse_yaml("meta:\n  secret: (( prune ))\nvalue: (( grab meta.secret.inner ))\n").unwrap();
    let outcome = Engine::new().weave(vec![base, overlay]).unwrap();
    assert_eq!(get(&outcome, "value").as_str(), Some("shh"));
    assert!(weave::document::resolve(&outcome.document, "meta.secret").is_err());
}

#[test]
fn s7_static_ip_conflict_is_detected() {
    let doc = Document::parse_yaml(
        "jobs:\n  - name: web\n    instances: 1\n    networks:\n      - name: net1\n        static_ips: (( static_ips 0 ))\n  - name: api\n    instances: 1\n    networks:\n      - name: net1\n        static_ips: (( static_ips 0 ))\n",
    )
    .unwrap();
    let err = Engine::new().weave(vec![doc]).unwrap_err();
    assert!(err.to_string().contains("already allocated"));
}
