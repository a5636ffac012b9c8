/// Command dispatch: fan one inbound event out into concurrent jobs.
use std::sync::Arc;

use anyhow::anyhow;
use apibot_core::{ApiBotError, CommandParser, DeliveryAdapter, RequestAdapter};
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::job::Job;
use crate::registry::RendererRegistry;

/// Default cap on jobs running at once for one dispatcher.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 16;

/// Why a command request did not become a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The request carried no text, or only whitespace.
    NoCommand,
    /// The command key has no registered renderer.
    UnknownCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub sender_id: String,
    pub reason: SkipReason,
}

/// Result of dispatching one event.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Completed jobs, in request order.
    pub jobs: Vec<Job>,
    pub skipped: Vec<Skipped>,
}

pub struct CommandDispatcher {
    source: Arc<dyn RequestAdapter>,
    parser: Arc<dyn CommandParser>,
    delivery: Arc<dyn DeliveryAdapter>,
    limiter: Arc<Semaphore>,
}

impl CommandDispatcher {
    pub fn new(
        source: Arc<dyn RequestAdapter>,
        parser: Arc<dyn CommandParser>,
        delivery: Arc<dyn DeliveryAdapter>,
    ) -> Self {
        Self {
            source,
            parser,
            delivery,
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_JOBS)),
        }
    }

    /// Bound the number of jobs in flight; zero is treated as one.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Turn an event into jobs without running them.
    pub fn plan(&self, event: &serde_json::Value, registry: &RendererRegistry) -> (Vec<Job>, Vec<Skipped>) {
        let mut jobs = Vec::new();
        let mut skipped = Vec::new();

        for request in self.source.process(event) {
            let parsed = self.parser.parse(&request);
            let Some(cmd) = parsed.cmd.as_deref() else {
                skipped.push(Skipped {
                    sender_id: parsed.sender_id,
                    reason: SkipReason::NoCommand,
                });
                continue;
            };
            match registry.get_renderer(cmd) {
                Some(renderer) => jobs.push(Job::new(&parsed, renderer, Arc::clone(&self.delivery))),
                None => {
                    warn!(cmd = %cmd, sender = %parsed.sender_id, "[Commands] No renderer registered, skipping request");
                    skipped.push(Skipped {
                        sender_id: parsed.sender_id.clone(),
                        reason: SkipReason::UnknownCommand(cmd.to_string()),
                    });
                }
            }
        }
        (jobs, skipped)
    }

    /// Dispatch every command in `event` and wait for all jobs.
    ///
    /// Fails with the first job error as soon as it happens; jobs still in
    /// flight keep running on their own tasks and their outcome is not reported.
    pub async fn exec(
        &self,
        event: &serde_json::Value,
        registry: &RendererRegistry,
    ) -> Result<DispatchOutcome, ApiBotError> {
        let (jobs, skipped) = self.plan(event, registry);
        if jobs.is_empty() {
            return Ok(DispatchOutcome { jobs, skipped });
        }
        info!(
            adapter = self.source.name(),
            jobs = jobs.len(),
            skipped = skipped.len(),
            "[Commands] Dispatching event"
        );

        let handles = jobs.into_iter().map(|job| {
            let limiter = Arc::clone(&self.limiter);
            tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| ApiBotError::Other(e.into()))?;
                let id = job.id;
                let cmd = job.cmd().to_string();
                job.exec().await.inspect_err(|e| {
                    error!(job = %id, cmd = %cmd, kind = e.kind(), error = %e, "Job failed");
                })
            })
        });

        let jobs = try_join_all(handles.map(|handle| async move {
            handle
                .await
                .map_err(|e| ApiBotError::Other(anyhow!("job task aborted: {e}")))?
        }))
        .await?;

        Ok(DispatchOutcome { jobs, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apibot_core::{CommandConfig, CommandRequest, FormatSpec, OutboundMessage, ResponseShape};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::detection::SlashParser;

    /// `[{"sender_id": .., "text": ..}, ..]`
    struct ListAdapter;

    impl RequestAdapter for ListAdapter {
        fn name(&self) -> &str {
            "list"
        }

        fn process(&self, raw: &Value) -> Vec<CommandRequest> {
            serde_json::from_value(raw.clone()).unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl DeliveryAdapter for Outbox {
        fn name(&self) -> &str {
            "outbox"
        }

        async fn deliver(&self, message: &OutboundMessage) -> Result<(), ApiBotError> {
            if self.fail {
                return Err(ApiBotError::delivery("outbox", "rejected"));
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn dispatcher(outbox: Arc<Outbox>) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(ListAdapter), Arc::new(SlashParser), outbox)
    }

    fn country(server: &MockServer) -> CommandConfig {
        CommandConfig::new(
            "/country",
            format!("{}/name/${{args.name}}", server.uri()),
            "${body.name} can be found in ${body.subregion}. ${body.name} has a population of ${body.population}.",
        )
        .with_args(["name"])
        .with_response(ResponseShape::json().with_format(FormatSpec::field("population", ",d")))
    }

    async fn country_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/name/Singapore"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Singapore",
                "subregion": "ASEAN",
                "population": 50000000
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn one_job_per_command_request() {
        let server = country_server().await;
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![country(&server)]);
        let outbox = Arc::new(Outbox::default());

        let event = json!([
            {"sender_id": "<PSID1>", "text": "/country Singapore"},
            {"sender_id": "<PSID2>"}
        ]);
        let outcome = dispatcher(Arc::clone(&outbox)).exec(&event, &registry).await.unwrap();

        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(
            outcome.skipped,
            vec![Skipped {
                sender_id: "<PSID2>".into(),
                reason: SkipReason::NoCommand
            }]
        );

        let job = &outcome.jobs[0];
        assert_eq!(job.cmd(), "/country");
        assert_eq!(job.url, format!("{}/name/Singapore", server.uri()));
        assert_eq!(job.body.as_ref().unwrap()["population"], "50,000,000");
        let expected = "Singapore can be found in ASEAN. Singapore has a population of 50,000,000.";
        assert_eq!(job.text.as_deref(), Some(expected));

        let sent = outbox.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender_id, "<PSID1>");
        assert_eq!(sent[0].text, expected);
    }

    #[tokio::test]
    async fn unknown_commands_are_skipped_not_fatal() {
        let server = country_server().await;
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![country(&server)]);
        let outbox = Arc::new(Outbox::default());

        let event = json!([
            {"sender_id": "a", "text": "/weather Paris"},
            {"sender_id": "b", "text": "/country Singapore"}
        ]);
        let outcome = dispatcher(Arc::clone(&outbox)).exec(&event, &registry).await.unwrap();
        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::UnknownCommand("/weather".into()));
        assert_eq!(outbox.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_event_yields_empty_outcome() {
        let registry = RendererRegistry::default();
        let outcome = dispatcher(Arc::new(Outbox::default()))
            .exec(&json!({"object": "unknown"}), &registry)
            .await
            .unwrap();
        assert!(outcome.jobs.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn empty_text_response_fails_the_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        let config = CommandConfig::new("/quote", format!("{}/quote", server.uri()), "${body}")
            .with_response(ResponseShape::text());
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![config]);
        let outbox = Arc::new(Outbox::default());

        let err = dispatcher(Arc::clone(&outbox))
            .exec(&json!([{"sender_id": "a", "text": "/quote"}]), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiBotError::EmptyResponse { .. }));
        assert!(outbox.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_fails_with_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;
        let config = CommandConfig::new("/joke", server.uri(), "${body.joke}");
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![config]);

        let err = dispatcher(Arc::new(Outbox::default()))
            .exec(&json!([{"sender_id": "a", "text": "/joke"}]), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiBotError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_network_error() {
        let config = CommandConfig::new("/down", "http://127.0.0.1:1/", "${body}");
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![config]);

        let err = dispatcher(Arc::new(Outbox::default()))
            .exec(&json!([{"sender_id": "a", "text": "/down"}]), &registry)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
    }

    #[tokio::test]
    async fn delivery_failure_fails_the_dispatch() {
        let server = country_server().await;
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![country(&server)]);
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Outbox::default()
        });

        let err = dispatcher(outbox)
            .exec(&json!([{"sender_id": "a", "text": "/country Singapore"}]), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiBotError::Delivery { .. }));
    }

    #[tokio::test]
    async fn one_failure_does_not_touch_sibling_jobs() {
        let server = country_server().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("oops"))
            .mount(&server)
            .await;
        let broken = CommandConfig::new("/broken", format!("{}/broken", server.uri()), "${body}");
        let registry =
            RendererRegistry::from_commands(reqwest::Client::new(), vec![country(&server), broken]);
        let outbox = Arc::new(Outbox::default());

        let event = json!([
            {"sender_id": "a", "text": "/broken"},
            {"sender_id": "b", "text": "/country Singapore"}
        ]);
        let err = dispatcher(Arc::clone(&outbox)).exec(&event, &registry).await.unwrap_err();
        assert!(matches!(err, ApiBotError::MalformedResponse { .. }));

        // The sibling finishes in the background and still delivers its reply.
        for _ in 0..50 {
            if !outbox.sent.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let sent = outbox.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender_id, "b");
    }

    #[tokio::test]
    async fn concurrency_cap_still_runs_every_job() {
        let server = country_server().await;
        let registry = RendererRegistry::from_commands(reqwest::Client::new(), vec![country(&server)]);
        let outbox = Arc::new(Outbox::default());

        let event: Value = (0..5)
            .map(|i| json!({"sender_id": i.to_string(), "text": "/country Singapore"}))
            .collect();
        let outcome = dispatcher(Arc::clone(&outbox))
            .with_max_concurrent_jobs(2)
            .exec(&event, &registry)
            .await
            .unwrap();
        assert_eq!(outcome.jobs.len(), 5);
        let senders: Vec<_> = outcome.jobs.iter().map(|j| j.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(outbox.sent.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn missing_args_still_build_a_job() {
        let registry = RendererRegistry::default();
        registry.add(
            "/country",
            CommandConfig::new("/country", "https://x/${args.name.first}", "").with_args(["name"]),
        );
        let (jobs, _) = dispatcher(Arc::new(Outbox::default()))
            .plan(&json!([{"sender_id": "a", "text": "/country"}]), &registry);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, crate::renderer::RENDERER_ERROR);
        assert!(jobs[0].args.is_empty());
    }
}
