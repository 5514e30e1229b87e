use std::time::{Duration, Instant};

use autograde::{ExecutionOutcome, ExecutionStage, Grader, TestCase};

use super::{Course, fixture_source, process_alive, roster, scores};

#[tokio::test]
async fn test_timeout_kills_program() {
    let mut course = Course::new(1);
    course.config.timeout = 1.0;
    course.config.keep_work_dir = true;
    course.task("t1", "", "never\n");
    course.task("t2", "", "never\n");
    course.submit("s1", &[Some("hang.sh")]);

    let table = scores(r#"{"1": {"t1": 10, "t2": 5}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();

    let started = Instant::now();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));

    let result = &records[0].problems[&1];
    assert_eq!(result.score, 0.0);
    assert_eq!(result.reason(), "t1-TLE, t2-TLE");

    let pid = std::fs::read_to_string(course.work_dir().join("hang.pid")).unwrap();
    assert!(!process_alive(&pid), "timed out program is still running");
}

#[tokio::test]
async fn test_runtime_error_carries_stderr() {
    let course = Course::new(1);
    course.task("t1", "", "\n");
    course.submit("s1", &[Some("crash.sh")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 10}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(
        records[0].problems[&1].reason(),
        "t1-RE segmentation fault (core dumped)"
    );
}

#[tokio::test]
async fn test_mixed_outcomes_keep_task_order() {
    let course = Course::new(1);
    course.task("a", "1 1\n", "2\n");
    course.task("b", "1 1\n", "3\n");
    course.task("c", "2 2\n", "4\n");
    course.submit("s1", &[Some("sum.sh")]);

    let table = scores(r#"{"1": {"c": 30, "b": 30, "a": 40}}"#);
    let grader = Grader::new(course.config.clone(), table).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 70.0);
    assert_eq!(records[0].problems[&1].reason(), "b");
}

#[tokio::test]
async fn test_parallel_execution_matches_sequential() {
    let mut course = Course::new(1);
    let mut json = String::from(r#"{"1": {"#);
    for i in 0..8 {
        let expected = if i % 3 == 0 { i + 1 } else { i * 2 };
        course.task(&format!("t{i}"), &format!("{i} {i}\n"), &format!("{expected}\n"));
        if i > 0 {
            json.push(',');
        }
        json.push_str(&format!(r#""t{i}": 1"#));
    }
    json.push_str("}}");
    course.submit("s1", &[Some("sum.sh")]);

    let sequential = Grader::new(course.config.clone(), scores(&json)).unwrap();
    let expected = sequential.grade_batch(&roster(&["s1"])).await.unwrap();

    course.config.parallelism = 4;
    let parallel = Grader::new(course.config.clone(), scores(&json)).unwrap();
    let actual = parallel.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(actual, expected);
    // Every third expected output is deliberately wrong
    assert_eq!(actual[0].problems[&1].reason(), "t0, t3, t6");
    assert_eq!(actual[0].problems[&1].score, 5.0);
}

#[tokio::test]
async fn test_execution_stage_directly() {
    let course = Course::new(1);
    course.task("t1", "5 6\n", "11\n");
    let program = course.root().join("prog");
    std::fs::write(&program, fixture_source("sum.sh")).unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let case = TestCase {
        problem: 1,
        task: "t1".to_owned(),
        input: course.config.testdata_dir.join("t1.in"),
        expected: course.config.testdata_dir.join("t1.out"),
        points: 10.0,
    };
    let stage = ExecutionStage::new(&course.config, course.root());

    assert_eq!(stage.run(&program, &case).await, ExecutionOutcome::Success);
    assert_eq!(
        std::fs::read_to_string(course.root().join("user_01_t1.out")).unwrap(),
        "11\n"
    );
}

#[tokio::test]
#[ignore = "requires g++"]
async fn test_real_compiler() {
    let mut course = Course::new(1);
    course.config.toolchain = autograde::config::ToolchainConfig::default();
    course.task("t1", "20 22\n", "42\n");
    course.submit("s1", &[Some("sum.cpp")]);

    let grader = Grader::new(course.config.clone(), scores(r#"{"1": {"t1": 100}}"#)).unwrap();
    let records = grader.grade_batch(&roster(&["s1"])).await.unwrap();

    assert_eq!(records[0].problems[&1].score, 100.0);
}
