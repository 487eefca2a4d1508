use assert_call::{call, CallRecorder};

use super::*;
use crate::{effect, Runtime, SignalContext};

#[test]
fn key_reader_retriggers_only_for_its_key() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    m.insert("a".into(), 1);
    m.insert("b".into(), 2);
    let _s = {
        let m = m.clone();
        effect(move |sc| call!("a {:?}", m.get_cloned(sc, &"a".into())))
    };
    cr.verify("a Some(1)");

    m.insert("b".into(), 3);
    rt.update();
    cr.verify(());

    m.insert("a".into(), 10);
    rt.update();
    cr.verify("a Some(10)");
}

#[test]
fn insert_with_unchanged_value_does_not_trigger() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    m.insert("a".into(), 1);
    let _s = {
        let m = m.clone();
        effect(move |sc| call!("a {:?}", m.get_cloned(sc, &"a".into())))
    };
    cr.verify("a Some(1)");

    m.insert("a".into(), 1);
    rt.update();
    cr.verify(());
}

#[test]
fn keys_reader_ignores_value_updates() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    m.insert("a".into(), 1);
    let _s = {
        let m = m.clone();
        effect(move |sc| {
            let mut keys = m.keys(sc);
            keys.sort();
            call!("keys {:?}", keys);
        })
    };
    cr.verify(r#"keys ["a"]"#);

    // value update keeps the key set intact
    m.insert("a".into(), 2);
    rt.update();
    cr.verify(());

    m.insert("b".into(), 3);
    rt.update();
    cr.verify(r#"keys ["a", "b"]"#);

    m.remove(&"a".into());
    rt.update();
    cr.verify(r#"keys ["b"]"#);
}

#[test]
fn contains_key_tracks_presence() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    let _s = {
        let m = m.clone();
        effect(move |sc| call!("has {}", m.contains_key(sc, &"a".into())))
    };
    cr.verify("has false");

    m.insert("a".into(), 1);
    rt.update();
    cr.verify("has true");

    m.remove(&"a".into());
    rt.update();
    cr.verify("has false");
}

#[test]
fn iteration_observes_every_mutation() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    let _s = {
        let m = m.clone();
        effect(move |sc| call!("len {}", m.with(sc, |m| m.len())))
    };
    cr.verify("len 0");

    m.insert("a".into(), 1);
    rt.update();
    cr.verify("len 1");

    m.insert("a".into(), 2);
    rt.update();
    cr.verify("len 1");

    m.clear();
    rt.update();
    cr.verify("len 0");
}

#[test]
fn version_increases_on_effective_writes_only() {
    let _rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    let mut sc = SignalContext::detached();
    let v0 = m.version(&mut sc);
    m.insert("a".into(), 1);
    let v1 = m.version(&mut sc);
    assert!(v1 > v0);

    m.insert("a".into(), 1);
    let v2 = m.version(&mut sc);
    assert_eq!(v2, v1);
}

#[test]
fn remove_missing_key_is_a_no_op() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    let _s = {
        let m = m.clone();
        effect(move |sc| call!("len {}", m.len(sc)))
    };
    cr.verify("len 0");

    assert_eq!(m.remove(&"a".into()), None);
    rt.update();
    cr.verify(());
}

#[test]
fn read_only_view_shares_entries() {
    let mut cr = CallRecorder::new();
    let mut rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    let r = m.read_only();
    assert!(r.is_same(&m.read_only()));
    let _s = {
        let r = r.clone();
        effect(move |sc| call!("a {:?}", r.get_cloned(sc, &"a".into())))
    };
    cr.verify("a None");

    m.insert("a".into(), 1);
    rt.update();
    cr.verify("a Some(1)");
}

#[test]
fn serialize_and_deserialize() {
    let _rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    m.insert("a".into(), 1);
    let json = serde_json::to_string(&m).unwrap();
    assert_eq!(json, r#"{"a":1}"#);

    let m2: ReactiveMap<String, i32> = serde_json::from_str(&json).unwrap();
    let mut sc = SignalContext::detached();
    assert_eq!(m2.get_cloned(&mut sc, &"a".into()), Some(1));
}

#[test]
fn key_deps_of_departed_readers_are_pruned() {
    let _rt = Runtime::new();
    let m: ReactiveMap<String, i32> = ReactiveMap::new();
    m.insert("a".into(), 1);
    let s = {
        let m = m.clone();
        effect(move |sc| {
            m.get_cloned(sc, &"a".into());
        })
    };
    assert_eq!(m.0.key_deps.borrow().len(), 1);

    drop(s);
    m.insert("a".into(), 2);
    assert!(m.0.key_deps.borrow().is_empty());
}
