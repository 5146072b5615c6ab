//! Stage-by-stage tests for DeployChecker against a mocked platform.

#[cfg(test)]
mod tests {
    use crate::checker::{
        classify_deploy_action, classify_job_status, AccessToken, ActionDiff, ArtifactRelease,
        CheckRun, DeployAction, DeployChecker, FileUpsert, JobId, MockPlatformApi, PipelineJob,
        StageName, StageStatus, Verdict,
    };
    use crate::config::{CheckerConfig, Credentials};
    use crate::errors::WatchdogError;
    use crate::policy::{PollStep, RecordingSleeper};
    use std::sync::Arc;
    use std::time::Duration;

    const COMMIT: &str = "master-abcdef1";
    const SETTLE: Duration = Duration::from_secs(10);

    fn credentials() -> Credentials {
        Credentials {
            username: "ci-bot".to_string(),
            password: "secret".to_string(),
            namespace: "owen".to_string(),
        }
    }

    fn job(status: &str, show_id: Option<&str>) -> PipelineJob {
        PipelineJob {
            id: JobId::Number(42),
            show_id: show_id.map(str::to_string),
            status: status.to_string(),
        }
    }

    fn expect_login(api: &mut MockPlatformApi) {
        api.expect_issue_token()
            .withf(|username, password| username == "ci-bot" && password == "secret")
            .times(1)
            .returning(|_, _| {
                Ok(AccessToken {
                    access_token: Some("tok".to_string()),
                })
            });
        api.expect_authorize()
            .withf(|token, namespace| token == "tok" && namespace == "owen")
            .times(1)
            .returning(|_, _| Ok(()));
    }

    fn expect_commit(api: &mut MockPlatformApi) {
        api.expect_upsert_manifest()
            .withf(|content| content.ends_with(' ') && content.contains("kind: Deployment"))
            .times(1)
            .returning(|_| {
                Ok(FileUpsert {
                    file_path: Some("projects/23ef/blobs/abcdef1234567.yaml".to_string()),
                })
            });
    }

    fn expect_finished_build(api: &mut MockPlatformApi) {
        api.expect_pipeline_jobs()
            .times(1)
            .returning(|| Ok(vec![job("succeed", Some("master-abcdef1 update deploy.yaml"))]));
        api.expect_job_status().never();
    }

    fn expect_artifacts(api: &mut MockPlatformApi, tags: &'static [&'static str]) {
        api.expect_artifact_releases()
            .times(1)
            .returning(move || Ok(tags.iter().map(|t| ArtifactRelease::tagged(*t)).collect()));
    }

    fn expect_deploy(api: &mut MockPlatformApi, status: &'static str) {
        api.expect_deploy_actions()
            .times(1)
            .returning(move || Ok(vec![DeployAction::releasing(COMMIT, status)]));
    }

    fn green_api() -> MockPlatformApi {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &["master-0000000", COMMIT]);
        expect_deploy(&mut api, "succeed");
        api
    }

    async fn run(api: MockPlatformApi) -> (CheckRun, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let checker = DeployChecker::new(
            api,
            credentials(),
            CheckerConfig::default(),
            sleeper.clone(),
        );
        (checker.check().await, sleeper)
    }

    fn status(run: &CheckRun, stage: StageName) -> StageStatus {
        run.outcome(stage).map(|o| o.status).unwrap()
    }

    #[tokio::test]
    async fn test_green_run() {
        let (run, sleeper) = run(green_api()).await;

        assert!(run.is_healthy(), "errors: {:?}", run.errors());
        assert!(run.errors().is_empty());
        assert_eq!(run.commit_id.as_deref(), Some(COMMIT));
        assert_eq!(run.outcomes.len(), 5);
        // Settle delay before the build and artifact fetches, nothing else.
        assert_eq!(sleeper.sleeps(), vec![SETTLE, SETTLE]);
    }

    #[tokio::test]
    async fn test_login_failure_does_not_stop_other_stages() {
        let mut api = MockPlatformApi::new();
        api.expect_issue_token()
            .times(1)
            .returning(|_, _| Err(WatchdogError::client(401, "unauthorized")));
        api.expect_authorize().never();
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;
        let flags = run.flags();

        assert!(!flags.login);
        assert!(flags.commit_trigger && flags.build && flags.deploy);
        assert_eq!(
            run.errors(),
            vec!["checker error: [Status Code 401]: unauthorized"]
        );
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let mut api = MockPlatformApi::new();
        api.expect_issue_token()
            .returning(|_, _| Ok(AccessToken::default()));
        api.expect_authorize().never();
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;
        assert_eq!(status(&run, StageName::Login), StageStatus::Failed);
        assert!(run.errors()[0].contains("no access_token"));
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_no_commit_id() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        api.expect_upsert_manifest()
            .times(1)
            .returning(|_| Err(WatchdogError::client(500, "boom")));
        expect_finished_build(&mut api);
        api.expect_artifact_releases().never();
        api.expect_deploy_actions().never();

        let (run, _) = run(api).await;
        let flags = run.flags();

        assert_eq!(run.commit_id, None);
        assert!(flags.login);
        assert!(!flags.commit_trigger);
        assert!(!flags.build);
        assert!(!flags.deploy);
        assert_eq!(status(&run, StageName::Build), StageStatus::Passed);
        assert_eq!(
            run.errors(),
            vec![
                "checker error: commit error [Status Code 500]: boom",
                "checker error: artifact error no commit id to look for",
                "checker error: deploy error no commit id to wait for",
            ]
        );
    }

    #[tokio::test]
    async fn test_build_succeeded_job_skips_polling() {
        let (run, sleeper) = run(green_api()).await;
        assert_eq!(status(&run, StageName::Build), StageStatus::Passed);
        assert!(!sleeper.sleeps().contains(&Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_build_commit_mismatch_is_fatal() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs()
            .times(1)
            .returning(|| Ok(vec![job("running", Some("master-0000000 older change"))]));
        api.expect_job_status().never();
        api.expect_artifact_releases().never();
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;
        let flags = run.flags();

        assert!(!flags.commit_trigger);
        assert!(!flags.build);
        assert_eq!(status(&run, StageName::Artifact), StageStatus::Skipped);
        assert_eq!(
            run.errors(),
            vec!["checker error: pipeline commit_id error expected master-abcdef1, got master-0000000"]
        );
    }

    #[tokio::test]
    async fn test_build_failed_on_first_poll_stops_polling() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs()
            .returning(|| Ok(vec![job("running", Some("master-abcdef1 msg"))]));
        api.expect_job_status()
            .withf(|job_id| job_id == "42")
            .times(1)
            .returning(|_| Ok("failed".to_string()));
        api.expect_artifact_releases().never();
        expect_deploy(&mut api, "succeed");

        let (run, sleeper) = run(api).await;

        assert_eq!(status(&run, StageName::Build), StageStatus::Failed);
        assert_eq!(sleeper.sleeps(), vec![SETTLE]);
        assert_eq!(
            run.errors(),
            vec!["checker error: build error job 42 finished with status failed"]
        );
    }

    #[tokio::test]
    async fn test_build_running_then_succeed() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs()
            .returning(|| Ok(vec![job("running", Some("master-abcdef1 msg"))]));
        let mut polls = 0;
        api.expect_job_status().times(3).returning(move |_| {
            polls += 1;
            Ok(if polls < 3 { "running" } else { "succeed" }.to_string())
        });
        expect_artifacts(&mut api, &[COMMIT]);
        expect_deploy(&mut api, "succeed");

        let (run, sleeper) = run(api).await;

        assert!(run.is_healthy(), "errors: {:?}", run.errors());
        let thirty = Duration::from_secs(30);
        assert_eq!(sleeper.sleeps(), vec![SETTLE, thirty, thirty, SETTLE]);
    }

    #[tokio::test]
    async fn test_build_still_running_after_all_polls_fails() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs()
            .returning(|| Ok(vec![job("running", None)]));
        api.expect_job_status()
            .times(20)
            .returning(|_| Ok("running".to_string()));
        api.expect_artifact_releases().never();
        expect_deploy(&mut api, "succeed");

        let (run, sleeper) = run(api).await;

        assert_eq!(status(&run, StageName::Build), StageStatus::Failed);
        // Settle delay plus 19 waits between 20 polls.
        assert_eq!(sleeper.count(), 20);
        assert_eq!(
            run.errors(),
            vec!["checker error: build error job 42 still running after 20 polls"]
        );
    }

    #[tokio::test]
    async fn test_build_without_jobs_fails() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs().returning(|| Ok(Vec::new()));
        api.expect_artifact_releases().never();
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;
        assert_eq!(
            run.errors(),
            vec!["checker error: build error pipeline has no jobs"]
        );
    }

    #[tokio::test]
    async fn test_artifact_missing_names_expected_tag() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(
            &mut api,
            &[
                "master-1111111", "master-2222222", "master-3333333", "master-4444444",
                "master-5555555", "master-6666666", "master-7777777", "master-8888888",
                "master-9999999", "master-aaaaaaa",
            ],
        );
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;
        let flags = run.flags();

        assert!(flags.commit_trigger);
        assert!(!flags.build);
        assert!(flags.deploy);
        assert_eq!(
            run.errors(),
            vec!["checker error: artifact error expected master-abcdef1"]
        );
    }

    #[tokio::test]
    async fn test_deploy_user_failed_stops_immediately() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        expect_deploy(&mut api, "user_failed");

        let (run, sleeper) = run(api).await;
        let flags = run.flags();

        assert!(!flags.auto_deploy);
        assert!(!flags.deploy);
        assert_eq!(sleeper.count(), 2);
        assert_eq!(
            run.errors(),
            vec!["checker error: deploy error user_failed"]
        );
    }

    #[tokio::test]
    async fn test_deploy_waits_for_matching_release() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        let mut polls = 0;
        api.expect_deploy_actions().times(4).returning(move || {
            polls += 1;
            Ok(vec![match polls {
                1 => DeployAction::releasing("master-0000000", "succeed"),
                2 | 3 => DeployAction::releasing(COMMIT, "deploying"),
                _ => DeployAction::releasing(COMMIT, "succeed"),
            }])
        });

        let (run, sleeper) = run(api).await;

        assert!(run.is_healthy(), "errors: {:?}", run.errors());
        let three = Duration::from_secs(3);
        assert_eq!(sleeper.sleeps(), vec![SETTLE, SETTLE, three, three, three]);
    }

    #[tokio::test]
    async fn test_deploy_times_out_after_all_polls() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        api.expect_deploy_actions()
            .times(200)
            .returning(|| Ok(vec![DeployAction::releasing("master-0000000", "succeed")]));

        let (run, sleeper) = run(api).await;

        assert_eq!(status(&run, StageName::Deploy), StageStatus::Failed);
        assert_eq!(sleeper.count(), 2 + 199);
        assert_eq!(
            run.errors(),
            vec!["checker error: none deploy error expect artifact_version=master-abcdef1"]
        );
    }

    #[tokio::test]
    async fn test_deploy_fetch_error_aborts() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        api.expect_deploy_actions()
            .times(1)
            .returning(|| Err(WatchdogError::client(502, "bad gateway")));

        let (run, sleeper) = run(api).await;

        assert_eq!(sleeper.count(), 2);
        assert_eq!(
            run.errors(),
            vec!["checker error: deploy error [Status Code 502]: bad gateway"]
        );
    }

    #[tokio::test]
    async fn test_deploy_empty_action_list_aborts() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        api.expect_deploy_actions().times(1).returning(|| Ok(Vec::new()));

        let (run, _) = run(api).await;
        assert!(run.errors()[0].starts_with("checker error: deploy error decode error"));
    }

    #[tokio::test]
    async fn test_deploy_action_without_release_aborts() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        api.expect_deploy_actions().times(1).returning(|| {
            Ok(vec![DeployAction {
                status: "succeed".to_string(),
                diff: None,
            }])
        });

        let (run, sleeper) = run(api).await;

        assert_eq!(status(&run, StageName::Deploy), StageStatus::Failed);
        assert_eq!(sleeper.count(), 2);
        assert!(run.errors()[0].starts_with("checker error: deploy error decode error"));
    }

    #[tokio::test]
    async fn test_deploy_action_with_empty_services_aborts() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        expect_finished_build(&mut api);
        expect_artifacts(&mut api, &[COMMIT]);
        api.expect_deploy_actions().times(1).returning(|| {
            Ok(vec![DeployAction {
                status: "deploying".to_string(),
                diff: Some(ActionDiff::default()),
            }])
        });

        let (run, _) = run(api).await;
        assert!(!run.flags().deploy);
        assert!(run.errors()[0].starts_with("checker error: deploy error decode error"));
    }

    #[tokio::test]
    async fn test_empty_show_id_skips_commit_match() {
        let mut api = MockPlatformApi::new();
        expect_login(&mut api);
        expect_commit(&mut api);
        api.expect_pipeline_jobs()
            .times(1)
            .returning(|| Ok(vec![job("succeed", Some(""))]));
        api.expect_job_status().never();
        expect_artifacts(&mut api, &[COMMIT]);
        expect_deploy(&mut api, "succeed");

        let (run, _) = run(api).await;

        assert_eq!(status(&run, StageName::Build), StageStatus::Passed);
        assert!(run.is_healthy(), "errors: {:?}", run.errors());
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_failed_outcome() {
        let checker = DeployChecker::new(
            MockPlatformApi::new(),
            credentials(),
            CheckerConfig::default(),
            Arc::new(RecordingSleeper::new()),
        );

        #[allow(unreachable_code)]
        let exploding = async {
            panic!("token service exploded");
            Ok::<(), String>(())
        };
        let (outcome, value) = checker.run_stage(StageName::Login, exploding).await;

        assert_eq!(value, None);
        assert_eq!(outcome.status, StageStatus::Failed);
        assert_eq!(
            outcome.error(),
            Some("checker error: login stage panicked: token service exploded")
        );
    }

    #[test]
    fn test_classify_job_status() {
        assert_eq!(classify_job_status("succeed"), PollStep::Done(Verdict::Succeeded));
        assert_eq!(classify_job_status("running"), PollStep::Pending);
        assert_eq!(
            classify_job_status("canceled"),
            PollStep::Done(Verdict::Failed("canceled".to_string()))
        );
    }

    #[test]
    fn test_classify_deploy_action() {
        let matching = DeployAction::releasing(COMMIT, "succeed");
        assert_eq!(classify_deploy_action(&matching, COMMIT), PollStep::Done(Verdict::Succeeded));

        let failed = DeployAction::releasing(COMMIT, "user_failed");
        assert_eq!(
            classify_deploy_action(&failed, COMMIT),
            PollStep::Done(Verdict::Failed("user_failed".to_string()))
        );

        let other = DeployAction::releasing("master-0000000", "user_failed");
        assert_eq!(classify_deploy_action(&other, COMMIT), PollStep::Pending);
    }
}
