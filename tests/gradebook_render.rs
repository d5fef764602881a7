use std::{fs, time::SystemTime};

use bbfetch::{
    download::materialize,
    render::{gradebook_rows, render_gradebook},
};

mod remote_support;
use remote_support::{
    FakeRemote, attempt, custom_in, gradebook, memberships, store_in, student, temp_root,
    text_detail,
};

const LONG_NAME: &str = "Bartholomew Montgomery-Smithson III";

#[test]
fn rows_follow_visibility_ordering_and_glyphs() {
    let root = temp_root("render");
    let pending = attempt("_100_1", "au1", true, None);
    let mut cy = student("au3", "Cy", vec![attempt("_300_1", "au3", false, Some(2.5))]);
    cy.score = 2.5;

    let mut store = store_in(&root);
    *store.gradebook_mut() = gradebook(vec![
        student("au1", "Ada", vec![pending.clone()]),
        student(
            "au2",
            LONG_NAME,
            vec![
                attempt("_200_1", "au2", false, Some(0.0)),
                attempt("_201_1", "au2", false, Some(1.0)),
            ],
        ),
        cy,
        student("au4", "Hidden", vec![]),
    ]);
    store.groups_mut().replace(
        memberships(&[("au1", "Hold 1"), ("au2", "Hold 2"), ("au4", "Hold 9")]),
        SystemTime::now(),
    );
    let custom = custom_in(&root).with_visibility(|s, _| s.username != "au4");

    let rows = gradebook_rows(&store, &custom);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], ["Username", "Name", "Group", "|", "Week 1", "|", "Pts"]);
    assert_eq!(rows[1], ["au3", "Cy", "-", "|", "2.5", "|", "2.5"]);
    assert_eq!(rows[2], ["au1", "Ada", "Hold 1", "|", "\u{2913}", "|", "0"]);
    assert_eq!(rows[3], ["au2", LONG_NAME, "Hold 2", "|", "\u{2718}\u{2714}", "|", "0"]);

    let text = render_gradebook(&store, &custom);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        format!("Username {:<27} {:<6} | Wee | Pts", "Name", "Group")
    );
    assert!(lines[3].contains(&LONG_NAME[..27]));
    assert!(!lines[3].contains(LONG_NAME));
    assert!(lines.iter().all(|l| l == &l.trim_end()));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn pending_glyph_tracks_local_progress() {
    let root = temp_root("render-progress");
    let a = attempt("_100_1", "au1", true, None);
    let mut remote = FakeRemote::default();
    remote.details.insert(a.id.clone(), text_detail("hello"));
    let mut store = store_in(&root);
    *store.gradebook_mut() = gradebook(vec![student("au1", "Ada", vec![a.clone()])]);
    let custom = custom_in(&root);

    let cell = |store: &bbfetch::store::StateStore| gradebook_rows(store, &custom)[1][4].clone();

    assert_eq!(cell(&store), "\u{2913}");
    let report = materialize(&mut store, &remote, &custom, &a).expect("materialize");
    assert_eq!(cell(&store), "!");
    fs::write(report.directory.join("comments.txt"), "accepted").expect("feedback");
    assert_eq!(cell(&store), "\u{21A5}");

    let _ = fs::remove_dir_all(root);
}
