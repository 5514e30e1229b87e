use autograde::{GradeError, Grader, SubmissionError, render_report, write_report};

use super::{Course, roster, scores};

#[tokio::test]
async fn test_batch_grades_roster_in_order() {
    let course = Course::new(2);
    course.task("1_1", "1 2\n", "3\n");
    course.task("1_2", "10 20\n", "30\n");
    course.task("2_1", "hello\n", "hello\n");
    course.submit("s1", &[Some("sum.sh"), Some("echo.sh")]);
    course.submit("s2", &[Some("off_by_one.sh"), Some("echo.sh")]);

    let table = scores(r#"{"1": {"1_1": 40, "1_2": 60}, "2": {"2_1": 100}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader
        .grade_batch(&roster(&["s2", "s1", "s3"]))
        .await
        .expect("Batch failed");

    let candidates: Vec<_> = records.iter().map(|r| r.candidate.as_str()).collect();
    assert_eq!(candidates, vec!["s2", "s1", "s3"]);

    // s2 is off by one on every task of problem 1
    assert_eq!(records[0].problems[&1].score, 0.0);
    assert_eq!(records[0].problems[&1].reason(), "1_1, 1_2");
    assert_eq!(records[0].problems[&2].score, 100.0);

    assert_eq!(records[1].problems[&1].score, 100.0);
    assert_eq!(records[1].problems[&1].reason(), "");
    assert_eq!(records[1].total(), 200.0);

    // s3 never submitted
    assert_eq!(records[2].problems[&1].reason(), "no submission");
    assert_eq!(records[2].problems[&2].reason(), "no submission");
    assert_eq!(records[2].total(), 0.0);

    // Work directory is removed after every candidate
    assert!(!course.work_dir().exists());
}

#[tokio::test]
async fn test_duplicate_submission_halts_before_grading() {
    let course = Course::new(1);
    course.task("t1", "1 2\n", "3\n");
    course.submit("s1", &[Some("sum.sh")]);
    course.submit_files("s2", "_first", &[("s2_hw_01.cpp", "#!/bin/sh\necho 3\n")]);
    course.submit_files("s2", "_second", &[("s2_hw_01.cpp", "#!/bin/sh\necho 3\n")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let result = grader.grade_batch(&roster(&["s1", "s2"])).await;

    match result {
        Err(GradeError::Submission(SubmissionError::DuplicateSubmission { candidate, matches })) => {
            assert_eq!(candidate, "s2");
            assert_eq!(matches.len(), 2);
        }
        other => panic!("expected duplicate submission, got {other:?}"),
    }

    // Nothing was graded, not even the candidate before the duplicate
    assert!(!course.work_dir().exists());
}

#[tokio::test]
async fn test_folder_name_may_extend_candidate_id() {
    let course = Course::new(1);
    course.task("t1", "4 5\n", "9\n");
    course.submit_files(
        "112550128",
        "_Wang Xiao Ming",
        &[("112550128_hw_01.cpp", &super::fixture_source("sum.sh"))],
    );

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["112550128"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 10.0);
}

#[tokio::test]
async fn test_nested_sources_are_found() {
    let course = Course::new(2);
    course.task("t1", "1 1\n", "2\n");
    course.task("t2", "x\n", "x\n");
    course.submit_files(
        "s1",
        "",
        &[
            ("hw/s1_hw_01.cpp", &super::fixture_source("sum.sh")),
            ("hw/deep/s1_hw_02.cpp", &super::fixture_source("echo.sh")),
        ],
    );

    let table = scores(r#"{"1": {"t1": 50}, "2": {"t2": 50}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].total(), 100.0);
}

#[tokio::test]
async fn test_single_candidate_keeps_work_dir() {
    let mut course = Course::new(1);
    course.config.keep_work_dir = true;
    course.task("t1", "2 2\n", "4\n");
    course.submit("s1", &[Some("sum.sh")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();
    assert_eq!(records[0].problems[&1].score, 10.0);

    let artifact = course.work_dir().join(course.config.artifact_name(1));
    assert!(artifact.exists());
    assert!(course.work_dir().join("user_01_t1.out").exists());
}

#[tokio::test]
async fn test_previous_candidate_artifacts_do_not_leak() {
    let mut course = Course::new(1);
    course.config.keep_work_dir = true;
    course.task("t1", "2 2\n", "4\n");
    course.submit("s1", &[Some("sum.sh")]);
    course.submit("s2", &[Some("broken.sh")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1", "s2"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 10.0);
    assert_eq!(records[1].problems[&1].reason(), "CE");
}

#[tokio::test]
async fn test_report_matches_records() {
    let course = Course::new(1);
    course.task("t1", "1 2\n", "3\n");
    course.task("t2", "3 4\n", "7\n");
    course.submit("s1", &[Some("off_by_one.sh")]);
    course.submit("s2", &[Some("sum.sh")]);

    let table = scores(r#"{"1": {"t1": 30, "t2": 70}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1", "s2", "s3"])).await.unwrap();

    let report = course.root().join("hw_01.csv");
    write_report(&report, &records, 1).unwrap();
    let csv = std::fs::read_to_string(&report).unwrap();

    assert_eq!(csv, render_report(&records, 1));
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], "student_id,problem_01,reason_01");
    assert_eq!(lines[1], r#"s1,0,"t1, t2""#);
    assert_eq!(lines[2], "s2,100,");
    assert_eq!(lines[3], "s3,0,no submission");
}
