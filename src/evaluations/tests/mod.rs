use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{Experiment, MockExperimentTracker, Suite};
use crate::config::{Config, LLMConfiguration, LLMConfigurations, LangfuseConfiguration};
use crate::dataset::DatasetStatus;
use crate::judges::{Evaluation, EvaluationInput, Evaluator, JudgeError, MockStructuredPrompt};
use crate::langfuse::LangfuseClient;
use crate::rag::{MockRagPipeline, RagPipeline, RagResponse};
use crate::test_utils::{dataset, rag_response};

/// Scores the length of the answer, or fails when told to
struct StubEvaluator {
    name: &'static str,
    fail: bool,
}

#[async_trait]
impl Evaluator for StubEvaluator {
    fn name(&self) -> &'static str {
        self.name
    }

    #[allow(clippy::cast_precision_loss)]
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Evaluation, JudgeError> {
        if self.fail {
            return Err(JudgeError::EmptyResponse);
        }
        Ok(Evaluation {
            name: self.name.to_string(),
            value: input.output.answer.len() as f64,
            comment: Some(format!("scored {}", input.question)),
        })
    }
}

fn stub(name: &'static str, fail: bool) -> Arc<dyn Evaluator> {
    Arc::new(StubEvaluator { name, fail })
}

fn answering_task() -> MockRagPipeline {
    let mut task = MockRagPipeline::new();
    task.expect_answer().returning(|_| Ok(rag_response()));
    task
}

fn experiment(task: MockRagPipeline, evaluators: Vec<Arc<dyn Evaluator>>) -> Experiment {
    let mut builder = Experiment::builder();
    builder
        .name("Answers")
        .run_name("Answers - run 1")
        .task(Arc::new(task))
        .max_concurrency(2);
    for evaluator in evaluators {
        builder.evaluator(evaluator);
    }
    builder.build().unwrap()
}

#[test_log::test(tokio::test)]
async fn test_scores_every_active_item() {
    let mut dataset = dataset(&["first?", "second?", "third?"]);
    dataset.items[1].status = DatasetStatus::Archived;

    let mut tracker = MockExperimentTracker::new();
    tracker
        .expect_record_trace()
        .withf(|trace| trace.name == "experiment-item-run" && trace.output["answer"].is_string())
        .times(2)
        .returning(|_| Ok(()));
    tracker
        .expect_link_run_item()
        .withf(|link| link.run_name == "Answers - run 1")
        .times(2)
        .returning(|_| Ok(()));
    tracker
        .expect_record_score()
        .times(4)
        .returning(|_| Ok(()));
    tracker.expect_flush().once().returning(|| Ok(()));

    let result = experiment(
        answering_task(),
        vec![stub("answer_relevance", false), stub("faithfulness", false)],
    )
    .run(&dataset, &tracker)
    .await
    .unwrap();

    assert_eq!(result.run_name, "Answers - run 1");
    assert_eq!(result.dataset_name, "rag_bot_evals");

    let ids = result
        .item_results
        .iter()
        .map(|item| item.item_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["item-1", "item-3"]);

    for item in &result.item_results {
        assert!(item.is_success());
        assert!(item.errors.is_empty(), "{:?}", item.errors);
        let names = item
            .evaluations
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["answer_relevance", "faithfulness"]);
    }
    assert_eq!(
        result.item_results[0].evaluations[0].comment.as_deref(),
        Some("scored first?")
    );
}

#[test_log::test(tokio::test)]
async fn test_scores_are_recorded_on_the_item_trace() {
    let dataset = dataset(&["only?"]);
    let traces = Arc::new(Mutex::new(Vec::new()));
    let scores = Arc::new(Mutex::new(Vec::new()));

    let mut tracker = MockExperimentTracker::new();
    let traces_clone = Arc::clone(&traces);
    tracker.expect_record_trace().returning(move |trace| {
        traces_clone.lock().unwrap().push(trace);
        Ok(())
    });
    tracker.expect_link_run_item().returning(|_| Ok(()));
    let scores_clone = Arc::clone(&scores);
    tracker.expect_record_score().returning(move |score| {
        scores_clone.lock().unwrap().push(score);
        Ok(())
    });
    tracker.expect_flush().returning(|| Ok(()));

    let result = experiment(answering_task(), vec![stub("faithfulness", false)])
        .run(&dataset, &tracker)
        .await
        .unwrap();

    let traces = traces.lock().unwrap();
    let scores = scores.lock().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].input, json!({"question": "only?"}));
    assert_eq!(traces[0].id, result.item_results[0].trace_id);
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].trace_id, traces[0].id);
    assert_eq!(scores[0].name, "faithfulness");
}

#[test_log::test(tokio::test)]
async fn test_task_failure_only_fails_the_item() {
    let dataset = dataset(&["fine?", "boom?"]);

    let mut task = MockRagPipeline::new();
    task.expect_answer().returning(|question| {
        if question == "boom?" {
            anyhow::bail!("connection refused")
        }
        Ok(rag_response())
    });

    let traces = Arc::new(Mutex::new(Vec::new()));
    let mut tracker = MockExperimentTracker::new();
    let traces_clone = Arc::clone(&traces);
    tracker
        .expect_record_trace()
        .times(2)
        .returning(move |trace| {
            traces_clone.lock().unwrap().push(trace);
            Ok(())
        });
    tracker
        .expect_link_run_item()
        .times(2)
        .returning(|_| Ok(()));
    tracker
        .expect_record_score()
        .times(1)
        .returning(|_| Ok(()));
    tracker.expect_flush().once().returning(|| Ok(()));

    let result = experiment(task, vec![stub("answer_relevance", false)])
        .run(&dataset, &tracker)
        .await
        .unwrap();

    assert!(result.item_results[0].is_success());
    let failed = &result.item_results[1];
    assert!(!failed.is_success());
    assert!(failed.evaluations.is_empty());
    assert!(failed.errors[0].contains("connection refused"));
    assert_eq!(result.failed_items(), 1);

    // The failed item still shows up in the run, with the error as output
    let traces = traces.lock().unwrap();
    let failed_trace = traces
        .iter()
        .find(|trace| trace.id == failed.trace_id)
        .unwrap();
    assert_eq!(failed_trace.input, json!({"question": "boom?"}));
    assert!(failed_trace.output["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

/// Answers after a short delay, keeping track of how many calls overlap
#[derive(Default)]
struct SlowTask {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl RagPipeline for SlowTask {
    async fn answer(&self, _question: String) -> anyhow::Result<RagResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(rag_response())
    }
}

#[test_log::test(tokio::test)]
async fn test_items_run_up_to_max_concurrency() {
    let dataset = dataset(&["1?", "2?", "3?", "4?", "5?", "6?"]);

    let mut tracker = MockExperimentTracker::new();
    tracker.expect_record_trace().returning(|_| Ok(()));
    tracker.expect_link_run_item().returning(|_| Ok(()));
    tracker.expect_record_score().returning(|_| Ok(()));
    tracker.expect_flush().returning(|| Ok(()));

    let task = Arc::new(SlowTask::default());
    let mut builder = Experiment::builder();
    builder
        .name("Answers")
        .run_name("Answers - run 1")
        .task(Arc::clone(&task) as Arc<dyn RagPipeline>)
        .evaluator(stub("faithfulness", false))
        .max_concurrency(3);

    let result = builder
        .build()
        .unwrap()
        .run(&dataset, &tracker)
        .await
        .unwrap();

    assert_eq!(result.item_results.len(), 6);
    let peak = task.peak.load(Ordering::SeqCst);
    assert!(peak > 1, "items ran one at a time");
    assert!(peak <= 3, "{peak} items ran at once");
}

#[test_log::test(tokio::test)]
async fn test_undelivered_events_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/public/ingestion"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/dataset-run-items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run-item"})))
        .mount(&server)
        .await;

    let langfuse = LangfuseClient::from_config(&LangfuseConfiguration {
        public_key: Some("pk-lf-test".into()),
        secret_key: Some("sk-lf-test".into()),
        host: Url::parse(&server.uri()).unwrap(),
        flush_at: 2,
        timeout_secs: 5,
    })
    .unwrap();

    let mut builder = Experiment::builder();
    builder
        .name("Answers")
        .run_name("Answers - run 1")
        .task(Arc::new(answering_task()))
        .max_concurrency(1);

    // The first item's trace is queued, the second item's trace triggers the failing send
    let err = builder
        .build()
        .unwrap()
        .run(&dataset(&["first?", "second?"]), &langfuse)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("500"), "{err:#}");
    let ingestions = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/api/public/ingestion")
        .count();
    assert_eq!(ingestions, 2);
}

#[test_log::test(tokio::test)]
async fn test_evaluator_failure_is_skipped() {
    let dataset = dataset(&["first?"]);

    let mut tracker = MockExperimentTracker::new();
    tracker.expect_record_trace().returning(|_| Ok(()));
    tracker.expect_link_run_item().returning(|_| Ok(()));
    tracker
        .expect_record_score()
        .withf(|score| score.name == "faithfulness")
        .times(1)
        .returning(|_| Ok(()));
    tracker.expect_flush().returning(|| Ok(()));

    let result = experiment(
        answering_task(),
        vec![stub("answer_relevance", true), stub("faithfulness", false)],
    )
    .run(&dataset, &tracker)
    .await
    .unwrap();

    let item = &result.item_results[0];
    assert!(item.is_success());
    assert_eq!(item.evaluations.len(), 1);
    assert_eq!(item.errors.len(), 1);
    assert!(item.errors[0].starts_with("answer_relevance:"));
}

#[test_log::test(tokio::test)]
async fn test_link_failure_does_not_stop_scoring() {
    let dataset = dataset(&["first?"]);

    let mut tracker = MockExperimentTracker::new();
    tracker.expect_record_trace().returning(|_| Ok(()));
    tracker
        .expect_link_run_item()
        .returning(|_| Err(anyhow::anyhow!("run item rejected")));
    tracker
        .expect_record_score()
        .times(1)
        .returning(|_| Ok(()));
    tracker.expect_flush().returning(|| Ok(()));

    let result = experiment(answering_task(), vec![stub("faithfulness", false)])
        .run(&dataset, &tracker)
        .await
        .unwrap();

    assert_eq!(result.item_results[0].evaluations.len(), 1);
    assert!(result.item_results[0].errors[0].contains("run item rejected"));
}

#[tokio::test]
async fn test_flush_failure_fails_the_run() {
    let dataset = dataset(&["first?"]);

    let mut tracker = MockExperimentTracker::new();
    tracker.expect_record_trace().returning(|_| Ok(()));
    tracker.expect_link_run_item().returning(|_| Ok(()));
    tracker.expect_record_score().returning(|_| Ok(()));
    tracker
        .expect_flush()
        .returning(|| Err(anyhow::anyhow!("Langfuse is down")));

    let err = experiment(answering_task(), vec![stub("faithfulness", false)])
        .run(&dataset, &tracker)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("Langfuse is down"));
}

#[tokio::test]
async fn test_default_run_name_has_the_start_time() {
    let dataset = dataset(&["first?"]);

    let mut tracker = MockExperimentTracker::new();
    tracker.expect_record_trace().returning(|_| Ok(()));
    tracker
        .expect_link_run_item()
        .withf(|link| link.run_name.starts_with("Answers - 20"))
        .returning(|_| Ok(()));
    tracker.expect_flush().returning(|| Ok(()));

    let mut builder = Experiment::builder();
    builder
        .name("Answers")
        .task(Arc::new(answering_task()))
        .max_concurrency(1);
    let result = builder
        .build()
        .unwrap()
        .run(&dataset, &tracker)
        .await
        .unwrap();

    assert!(result.run_name.starts_with("Answers - 20"));
    assert!(result.item_results[0].evaluations.is_empty());
}

#[test]
fn test_builder_requires_a_task() {
    let err = Experiment::builder()
        .name("Answers")
        .max_concurrency(1)
        .build()
        .unwrap_err();

    assert!(err.to_string().contains("task"));
}

#[test]
fn test_suite_evaluators() {
    let llm: Arc<dyn crate::judges::StructuredPrompt> = Arc::new(MockStructuredPrompt::new());

    let answers = Suite::Answers
        .evaluators(&llm)
        .iter()
        .map(|e| e.name())
        .collect::<Vec<_>>();
    assert_eq!(answers, vec!["answer_relevance", "faithfulness"]);

    let retrieval = Suite::Retrieval
        .evaluators(&llm)
        .iter()
        .map(|e| e.name())
        .collect::<Vec<_>>();
    assert_eq!(retrieval, vec!["retrieval_relevance"]);

    assert_eq!(Suite::Answers.to_string(), "answers");
}

#[test]
fn test_suite_experiment_from_config() {
    let mut config = Config::default();
    config.llm = LLMConfigurations::Single(LLMConfiguration::Ollama {
        prompt_model: "llama3.1".into(),
        base_url: None,
    });
    config.concurrency = 3;

    let experiment = Suite::Retrieval
        .experiment(&config, Arc::new(MockRagPipeline::new()), Some("nightly"))
        .unwrap();

    assert_eq!(experiment.name(), "Multi-metric Evaluation");
    let debug = format!("{experiment:?}");
    assert!(debug.contains("retrieval_relevance"), "{debug}");
    assert!(debug.contains("max_concurrency: 3"), "{debug}");
    assert!(debug.contains("nightly"), "{debug}");
}
