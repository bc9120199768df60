//! Integration tests for the job controller.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;

use shipwright_core::{
    CoreError, CoreResult, FileSet, GenerationConfig, GenerationJob, InMemoryStore, JobCheckpoint,
    JobKind, JobStage, JobStatus, JobStore, Notification, NotificationKind, Notifier,
    NullNotifier, ProjectStore, ShipwrightConfig,
};
use shipwright_deploy::{MockDeployment, MockPlatform};
use shipwright_llm::{GenerationGateway, MockCompletionService, MockReply};
use shipwright_pipeline::{Collaborators, JobController};
use shipwright_runner::{MockBuild, MockRunner};
use shipwright_templates::StaticTemplateSource;

mock! {
    pub Notify {}

    #[async_trait]
    impl Notifier for Notify {
        async fn notify(&self, notification: &Notification) -> CoreResult<()>;
    }
}

const GENERATED: &str = "\
### FILE: src/app/page.tsx
```tsx
export default function Page() { return <h1>Todo</h1>; }
```
";

const FIX: &str = "\
### FILE: src/app/page.tsx
```tsx
export default function Page() { return <h1>Fixed</h1>; }
```
";

const TYPE_ERROR: &str = "\
Failed to compile.

./src/app/page.tsx:3:7
Type error: Type 'string' is not assignable to type 'number'.
";

struct Harness {
    store: InMemoryStore,
    llm: MockCompletionService,
    runner: MockRunner,
    platform: MockPlatform,
}

impl Harness {
    fn new(llm: MockCompletionService, runner: MockRunner, platform: MockPlatform) -> Self {
        Self {
            store: InMemoryStore::default(),
            llm,
            runner,
            platform,
        }
    }

    fn config() -> ShipwrightConfig {
        let mut config = ShipwrightConfig::default();
        config.generation = GenerationConfig {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            max_retries: 0,
            ..Default::default()
        };
        config.deploy.poll_interval_ms = 0;
        config.templates.default_template = "starter".to_string();
        config
    }

    fn controller(&self, notifier: Arc<dyn Notifier>) -> JobController {
        let templates = StaticTemplateSource::new().with_files(
            "starter",
            [
                ("package.json", "{\"name\":\"starter\"}"),
                ("src/app/page.tsx", "export default function Page() { return null; }"),
            ],
        );
        let config = Self::config();
        let gateway = GenerationGateway::new(Arc::new(self.llm.clone()), config.generation.clone());
        JobController::new(
            Collaborators {
                jobs: Arc::new(self.store.clone()),
                projects: Arc::new(self.store.clone()),
                templates: Arc::new(templates),
                gateway: Arc::new(gateway),
                runner: Arc::new(self.runner.clone()),
                platform: Arc::new(self.platform.clone()),
                notifier,
            },
            config,
        )
    }
}

fn initial_job(id: &str) -> GenerationJob {
    GenerationJob::new(id, "user-1", JobKind::Initial, "Build a todo app")
}

#[tokio::test]
async fn test_initial_job_completes_and_notifies() {
    let harness = Harness::new(
        MockCompletionService::new().add_text(GENERATED),
        MockRunner::new(),
        MockPlatform::new().add_deployment(MockDeployment::ready("https://todo.example.app")),
    );
    harness.store.insert_job(initial_job("job-1"));

    let mut notifier = MockNotify::new();
    notifier
        .expect_notify()
        .withf(|n: &Notification| {
            n.kind == NotificationKind::JobCompleted
                && n.job_id == "job-1"
                && n.url.as_deref() == Some("https://todo.example.app")
        })
        .times(1)
        .returning(|_| Ok(()));

    let status = harness
        .controller(Arc::new(notifier))
        .execute("job-1")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);

    let job = harness.store.job("job-1").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["deployedUrl"], json!("https://todo.example.app"));
    assert_eq!(result["buildIterations"], json!(1));
    assert_eq!(result["usage"]["calls"], json!(1));

    let project_id = result["projectId"].as_str().unwrap().to_string();
    assert!(project_id.starts_with("proj_"));
    let files = harness.store.project_files(&project_id).unwrap();
    assert!(files.get("src/app/page.tsx").unwrap().contains("Todo"));
    assert!(files.get("package.json").is_some());

    assert_eq!(harness.runner.run_count(), 1);
    assert_eq!(harness.platform.request_count(), 1);
    assert_eq!(harness.store.deployments().len(), 1);
}

#[tokio::test]
async fn test_build_fix_flows_into_deployment() {
    let harness = Harness::new(
        MockCompletionService::new().with_replies(vec![
            MockReply::text(GENERATED),
            MockReply::text(FIX),
        ]),
        MockRunner::new().with_builds(vec![MockBuild::fail("", TYPE_ERROR), MockBuild::pass("")]),
        MockPlatform::new(),
    );
    harness.store.insert_job(initial_job("job-2"));

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-2")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);

    let result = harness.store.job("job-2").unwrap().result.unwrap();
    assert_eq!(result["buildIterations"], json!(2));
    let deployed = &harness.platform.requests()[0];
    assert!(deployed.files.get("src/app/page.tsx").unwrap().contains("Fixed"));
}

#[tokio::test]
async fn test_stuck_deployment_fails_job_with_diagnostic() {
    let harness = Harness::new(
        MockCompletionService::new().with_replies(vec![
            MockReply::text(GENERATED),
            MockReply::text(FIX),
        ]),
        MockRunner::new(),
        MockPlatform::new().add_deployment(MockDeployment::build_error(TYPE_ERROR)),
    );
    harness.store.insert_job(initial_job("job-3"));

    let mut notifier = MockNotify::new();
    notifier
        .expect_notify()
        .withf(|n: &Notification| n.kind == NotificationKind::JobFailed && n.url.is_none())
        .times(1)
        .returning(|_| Ok(()));

    let status = harness
        .controller(Arc::new(notifier))
        .execute("job-3")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = harness.store.job("job-3").unwrap();
    let result = job.result.unwrap();
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["stuck"], json!(true));
    assert_eq!(result["attempts"], json!(3));

    let error = job.error.unwrap();
    assert_eq!(error["diagnostic"]["kind"], json!("stuck"));
    assert_eq!(error["diagnostic"]["phase"], json!("deploy"));
    assert!(error["message"].as_str().unwrap().contains("stuck"));
    assert_eq!(harness.platform.request_count(), 3);
}

#[tokio::test]
async fn test_follow_up_without_project_fails() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    harness.store.insert_job(GenerationJob::new(
        "job-4",
        "user-1",
        JobKind::FollowUp,
        "Make the header blue",
    ));

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-4")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = harness.store.job("job-4").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap()["message"]
        .as_str()
        .unwrap()
        .contains("job-4"));
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn test_follow_up_edits_existing_project() {
    let harness = Harness::new(
        MockCompletionService::new().add_text(FIX),
        MockRunner::new(),
        MockPlatform::new(),
    );
    let existing = FileSet::new()
        .with_file("package.json", "{}")
        .with_file("src/app/page.tsx", "old");
    harness
        .store
        .save_project_files("proj_existing", &existing)
        .await
        .unwrap();
    harness.store.insert_job(
        GenerationJob::new("job-5", "user-1", JobKind::FollowUp, "Change the title")
            .with_project("proj_existing")
            .with_context(json!({ "skipDeploy": true })),
    );

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-5")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);

    let files = harness.store.project_files("proj_existing").unwrap();
    assert!(files.get("src/app/page.tsx").unwrap().contains("Fixed"));
    assert!(harness.llm.requests()[0].user.contains("Change the title"));
    assert_eq!(harness.platform.request_count(), 0);
}

#[tokio::test]
async fn test_unparseable_generation_fails_job() {
    let harness = Harness::new(
        MockCompletionService::new().add_text("Sure, here is how you could build it."),
        MockRunner::new(),
        MockPlatform::new(),
    );
    harness.store.insert_job(initial_job("job-6"));

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-6")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);

    let error = harness.store.job("job-6").unwrap().error.unwrap();
    assert_eq!(error["diagnostic"]["kind"], json!("patch_parse_failure"));
    assert_eq!(error["stage"], json!("started"));
    assert_eq!(harness.runner.run_count(), 0);
}

#[tokio::test]
async fn test_generation_service_failure_fails_job() {
    let harness = Harness::new(
        MockCompletionService::new().add_reply(MockReply::status(401)),
        MockRunner::new(),
        MockPlatform::new(),
    );
    harness.store.insert_job(initial_job("job-7"));

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-7")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);
    let error = harness.store.job("job-7").unwrap().error.unwrap();
    assert_eq!(error["diagnostic"]["kind"], json!("generation_failed"));
}

#[tokio::test]
async fn test_missing_template_fails_job() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    harness
        .store
        .insert_job(initial_job("job-8").with_context(json!({ "template": "missing" })));

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-8")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);
    assert_ne!(harness.store.job("job-8").unwrap().status, JobStatus::Processing);
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn test_notifier_failure_does_not_change_status() {
    let harness = Harness::new(
        MockCompletionService::new().add_text(GENERATED),
        MockRunner::new(),
        MockPlatform::new(),
    );
    harness.store.insert_job(initial_job("job-9"));

    let mut notifier = MockNotify::new();
    notifier
        .expect_notify()
        .times(1)
        .returning(|_| Err(CoreError::Notification("webhook down".to_string())));

    let status = harness
        .controller(Arc::new(notifier))
        .execute("job-9")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(harness.store.job("job-9").unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_terminal_job_is_left_alone() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    harness.store.insert_job(initial_job("job-10"));
    harness
        .store
        .update_job_status("job-10", JobStatus::Processing, None, None)
        .await
        .unwrap();
    harness
        .store
        .update_job_status("job-10", JobStatus::Completed, Some(json!({ "done": true })), None)
        .await
        .unwrap();

    let mut notifier = MockNotify::new();
    notifier.expect_notify().never();

    let status = harness
        .controller(Arc::new(notifier))
        .execute("job-10")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(harness.store.job("job-10").unwrap().result, Some(json!({ "done": true })));
    assert_eq!(harness.llm.call_count(), 0);
    assert_eq!(harness.runner.run_count(), 0);
}

#[tokio::test]
async fn test_resume_from_validated_checkpoint_skips_to_deploy() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    let files = FileSet::new()
        .with_file("package.json", "{}")
        .with_file("src/app/page.tsx", "validated");
    harness
        .store
        .save_project_files("proj_resume", &files)
        .await
        .unwrap();
    harness.store.insert_job(initial_job("job-11"));
    harness
        .store
        .update_job_status(
            "job-11",
            JobStatus::Processing,
            Some(JobCheckpoint::new(JobStage::Validated, "proj_resume").to_payload()),
            None,
        )
        .await
        .unwrap();

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-11")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);

    assert_eq!(harness.llm.call_count(), 0);
    assert_eq!(harness.runner.run_count(), 0);
    assert_eq!(harness.platform.request_count(), 1);
    assert_eq!(
        harness.platform.requests()[0].files.get("src/app/page.tsx"),
        Some("validated")
    );
    let result = harness.store.job("job-11").unwrap().result.unwrap();
    assert_eq!(result["projectId"], json!("proj_resume"));
}

#[tokio::test]
async fn test_resume_with_lost_files_fails() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    harness.store.insert_job(initial_job("job-12"));
    harness
        .store
        .update_job_status(
            "job-12",
            JobStatus::Processing,
            Some(JobCheckpoint::new(JobStage::Generated, "proj_gone").to_payload()),
            None,
        )
        .await
        .unwrap();

    let status = harness
        .controller(Arc::new(NullNotifier))
        .execute("job-12")
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);
    let error = harness.store.job("job-12").unwrap().error.unwrap();
    assert!(error["message"].as_str().unwrap().contains("proj_gone"));
}

#[tokio::test]
async fn test_unknown_job_is_an_error() {
    let harness = Harness::new(MockCompletionService::new(), MockRunner::new(), MockPlatform::new());
    let result = harness
        .controller(Arc::new(NullNotifier))
        .execute("nope")
        .await;
    assert!(result.is_err());
}
