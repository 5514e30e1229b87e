use autograde::config::Rewrite;
use autograde::{BuildFailure, BuildVerdict, FileEncoding, Grader, WorkDir};

use super::{Course, fixture_source, roster, scores};

#[tokio::test]
async fn test_compile_error_scores_ce() {
    let course = Course::new(2);
    course.task("t1", "1 2\n", "3\n");
    course.task("t2", "a\n", "a\n");
    course.submit("s1", &[Some("broken.sh"), Some("echo.sh")]);

    let table = scores(r#"{"1": {"t1": 50}, "2": {"t2": 50}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 0.0);
    assert_eq!(records[0].problems[&1].reason(), "CE");
    // A broken problem does not affect its siblings
    assert_eq!(records[0].problems[&2].score, 50.0);
}

#[tokio::test]
async fn test_missing_source_scores_ce() {
    let course = Course::new(3);
    course.task("t1", "1 2\n", "3\n");
    course.submit("s1", &[Some("sum.sh"), None, None]);

    let table = scores(r#"{"1": {"t1": 10}, "2": {"t2": 10}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 10.0);
    assert_eq!(records[0].problems[&2].reason(), "CE");
    // Problem 3 has no tasks in the table but still needs a source
    assert_eq!(records[0].problems[&3].reason(), "CE");
}

#[tokio::test]
async fn test_illegal_header_is_never_compiled() {
    let mut course = Course::new(1);
    course.config.keep_work_dir = true;
    course.task("t1", "hi\n", "hi\n");
    course.submit("s1", &[Some("illegal.sh")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 0.0);
    assert_eq!(records[0].problems[&1].reason(), "CE");
    assert!(
        !course
            .work_dir()
            .join(course.config.artifact_name(1))
            .exists()
    );
}

#[tokio::test]
async fn test_custom_deny_list() {
    let mut course = Course::new(1);
    course.config.validator.deny = vec![r"^cat$".to_owned()];
    course.task("t1", "hi\n", "hi\n");
    course.submit("s1", &[Some("echo.sh")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].reason(), "CE");
}

#[tokio::test]
async fn test_unsupported_encoding_only_fails_its_problem() {
    let course = Course::new(2);
    course.task("t1", "1 2\n", "3\n");
    course.submit("s1", &[None, Some("sum.sh")]);
    // UTF-16 source for problem 1
    let path = course
        .submission_dir("s1", "")
        .join(course.config.source_name("s1", 1));
    std::fs::write(&path, b"\xFF\xFE#\0!\0/\0b\0i\0n\0").unwrap();

    let table = scores(r#"{"1": {"t1": 10}, "2": {"t1": 10}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].reason(), "CE");
    assert_eq!(records[0].problems[&2].score, 10.0);
}

#[tokio::test]
async fn test_big5_target_keeps_legal_sources_legal() {
    let mut course = Course::new(2);
    course.config.target_encoding = FileEncoding::Big5;
    course.task("t1", "2 3\n", "5\n");
    course.submit_files(
        "s1",
        "",
        &[
            (
                "s1_hw_01.cpp",
                "#!/bin/sh\n# 計算兩數之和\nread a b\necho $((a + b))\n",
            ),
            ("s1_hw_02.cpp", "#!/bin/sh\n# 註解\n# #include <iostream>\n"),
        ],
    );

    let table = scores(r#"{"1": {"t1": 10}, "2": {"t1": 10}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 10.0);
    assert_eq!(records[0].problems[&2].reason(), "CE");
}

#[tokio::test]
async fn test_rewrites_apply_before_compiling() {
    let mut course = Course::new(1);
    course.config.preprocess.rewrites = vec![Rewrite {
        pattern: r"PRINT\((\w+)\)".to_owned(),
        replacement: "echo $1".to_owned(),
    }];
    course.task("t1", "", "done\n");
    course.submit_files(
        "s1",
        "",
        &[("s1_hw_01.cpp", "#!/bin/sh\nPRINT(done)\n")],
    );

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 10.0);
}

#[tokio::test]
async fn test_compilation_stage_reports_verdicts() {
    let course = Course::new(3);
    let workdir = WorkDir::acquire(course.work_dir()).await.unwrap();
    workdir
        .write_file("s1_hw_01.cpp", fixture_source("sum.sh").as_bytes())
        .await
        .unwrap();
    workdir
        .write_file("s1_hw_02.cpp", fixture_source("illegal.sh").as_bytes())
        .await
        .unwrap();

    let grader = Grader::new(course.config.clone(), scores("{}")).unwrap();
    let record = grader.grade_staged(&workdir, "s1").await;
    assert_eq!(record.problems[&1].score, 0.0);
    assert_eq!(record.problems[&1].reason(), "");
    assert_eq!(record.problems[&2].reason(), "CE");
    assert_eq!(record.problems[&3].reason(), "CE");

    let toolchain = autograde::CommandToolchain::from_config(&course.config);
    let preprocessor = std::sync::Arc::new(
        autograde::Preprocessor::from_config(
            course.config.target_encoding,
            &course.config.preprocess,
        )
        .unwrap(),
    );
    let validator = std::sync::Arc::new(autograde::SourceValidator::default());
    let stage =
        autograde::CompilationStage::new(&course.config, &toolchain, preprocessor, validator);
    let units = stage.build(&workdir, "s1").await;

    assert!(matches!(units[0].build, BuildVerdict::Built(_)));
    assert_eq!(
        units[1].build,
        BuildVerdict::Failed(BuildFailure::IllegalConstruct)
    );
    assert_eq!(
        units[2].build,
        BuildVerdict::Failed(BuildFailure::SourceNotFound)
    );

    workdir.release().await.unwrap();
}
