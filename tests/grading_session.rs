use std::{fs, path::Path};

use bbfetch::{
    Grading, RunOptions, RunOutcome, Settings,
    grading::{AttemptSpec, LookupError},
};

mod remote_support;
use remote_support::{
    FakeRemote, attempt, custom_in, gradebook, memberships, store_in, student, temp_root,
    text_detail,
};

fn settings(root: &Path) -> Settings {
    Settings::builder()
        .course("_1_1")
        .username("grader")
        .state_path(root.join("grading.json"))
        .token_file(root.join("token"))
        .build()
}

fn remote() -> FakeRemote {
    let mut remote = FakeRemote::default();
    remote.gradebook = gradebook(vec![
        student(
            "au1",
            "Ada",
            vec![
                attempt("_100_1", "au1", false, Some(0.0)),
                attempt("_101_1", "au1", true, None),
            ],
        ),
        student("au2", "Bob", vec![attempt("_200_1", "au2", true, None)]),
    ]);
    remote.groups = memberships(&[("au1", "Hold 1"), ("au2", "Hold 2")]);
    for id in ["_100_1", "_101_1", "_200_1"] {
        remote.details.insert(id.into(), text_detail("hello"));
    }
    remote
}

fn session(root: &Path, remote: FakeRemote) -> Grading<FakeRemote> {
    Grading::new(settings(root), store_in(root), remote, custom_in(root))
}

#[test]
fn refresh_fetches_groups_only_when_stale() {
    let root = temp_root("refresh");
    let mut grading = session(&root, remote());

    grading.refresh().expect("first refresh");
    grading.refresh().expect("second refresh");

    assert_eq!(grading.remote().gradebook_calls.get(), 2);
    assert_eq!(grading.remote().group_calls.get(), 1);
    assert_eq!(grading.store().username(), Some("grader"));
    assert_eq!(grading.store().gradebook().students.len(), 2);
    assert!(root.join("grading.json").exists());

    grading.refresh_groups().expect("forced refresh");
    assert_eq!(grading.remote().group_calls.get(), 2);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn attempts_are_found_by_display_names() {
    let root = temp_root("lookup");
    let mut grading = session(&root, remote());
    grading.refresh().expect("refresh");

    let spec: AttemptSpec = "Hold 1/Week 1/0".parse().expect("spec");
    assert_eq!(grading.find_attempt(&spec).expect("first").id, "_100_1");

    let newest: AttemptSpec = "Hold 1/Week 1/-1".parse().expect("spec");
    assert_eq!(grading.find_attempt(&newest).expect("newest").id, "_101_1");

    let missing: AttemptSpec = "Hold 7/Week 1/0".parse().expect("spec");
    assert_eq!(
        grading.find_attempt(&missing),
        Err(LookupError::NoGroupFound {
            name:  "Hold 7".into(),
            valid: vec!["Hold 1".into(), "Hold 2".into()],
        })
    );

    let wrong: AttemptSpec = "Hold 2/Week 9/0".parse().expect("spec");
    let err = grading.find_attempt(&wrong).expect_err("no assignment");
    assert_eq!(err.to_string(), "No assignments named `Week 9`. Must be one of: Week 1");

    let out_of_range: AttemptSpec = "Hold 2/Week 1/3".parse().expect("spec");
    assert!(matches!(
        grading.find_attempt(&out_of_range),
        Err(LookupError::NoAttempt { index: 3, .. })
    ));

    assert!(matches!(
        "Hold 1/Week 1".parse::<AttemptSpec>(),
        Err(LookupError::Malformed(_))
    ));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn unreachable_platform_falls_back_to_cached_state() {
    let root = temp_root("offline");
    {
        let mut grading = session(&root, remote());
        grading.refresh().expect("online refresh");
    }

    let offline = remote();
    offline.offline.set(true);
    let mut grading = session(&root, offline);
    let options = RunOptions::builder().upload(true).build();

    let mut out = Vec::new();
    grading.run(&options, &mut out).expect("offline run");
    let text = String::from_utf8(out).expect("utf8");

    assert!(text.starts_with("Username"));
    assert!(text.contains("Ada"));
    assert_eq!(grading.remote().gradebook_calls.get(), 0);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn download_then_upload_round() {
    let root = temp_root("round");
    let mut grading = session(&root, remote());

    let download = RunOptions::builder().download(1).build();
    assert_eq!(grading.execute(&download, &mut Vec::new()), RunOutcome::Saved);
    assert_eq!(grading.remote().detail_calls.get(), 2);
    assert!(root.join("_101_1").join("submission.txt").exists());
    assert!(root.join("_200_1").join("submission.txt").exists());
    assert!(!root.join("_100_1").exists());

    fs::write(root.join("_101_1").join("comments.txt"), "Accepted").expect("feedback");
    let upload = RunOptions::builder().upload(true).build();
    let mut out = Vec::new();
    assert_eq!(grading.execute(&upload, &mut out), RunOutcome::Saved);

    let sent = grading.remote().submitted.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attempt_id, "_101_1");
    assert!(sent[0].group);
    assert_eq!(grading.remote().gradebook_calls.get(), 3);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn rejected_credentials_forget_the_token_and_keep_old_state() {
    let root = temp_root("bad-token");
    fs::write(root.join("token"), "stale").expect("token");
    let rejecting = remote();
    rejecting.reject_login.set(true);
    let mut grading = session(&root, rejecting);

    let outcome = grading.execute(&RunOptions::builder().build(), &mut Vec::new());

    assert_eq!(outcome, RunOutcome::BadCredentials);
    assert!(!root.join("token").exists());
    assert!(!root.join("grading.json").exists());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn unreadable_response_stops_the_run_and_keeps_old_state() {
    let root = temp_root("parse");
    {
        let mut grading = session(&root, remote());
        grading.refresh().expect("online refresh");
    }
    let before = fs::read(root.join("grading.json")).expect("state file");

    let garbled = remote();
    let saved = root.join("response.html");
    *garbled.malformed.borrow_mut() = Some(saved.clone());
    let mut grading = session(&root, garbled);

    let mut out = Vec::new();
    let outcome = grading.execute(&RunOptions::builder().download(1).build(), &mut out);

    assert_eq!(outcome, RunOutcome::ParseFailure(saved));
    assert!(out.is_empty());
    assert_eq!(fs::read(root.join("grading.json")).expect("state file"), before);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn check_report_lists_students_and_directories() {
    let root = temp_root("check");
    let mut grading = session(&root, remote());
    grading.refresh().expect("refresh");

    let mut out = Vec::new();
    grading.check_report(&mut out).expect("check");
    let text = String::from_utf8(out).expect("utf8");

    assert!(text.contains("Username: grader"));
    assert!(text.contains("Course: _1_1"));
    assert!(text.contains("Hold 2"));
    assert!(text.contains(&root.join("_200_1").display().to_string()));

    let _ = fs::remove_dir_all(root);
}
