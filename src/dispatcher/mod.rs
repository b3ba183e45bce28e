use std::sync::Arc;

use indicatif::ProgressBar;
use log::{debug, error};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::executor::{self, Attempt, ExecutorError, ExecutorMode};
use crate::matcher::MatchConfig;
use crate::output::ResultSink;
use crate::template::RequestTemplate;

/// Maximum number of targets in flight at once.
pub const POOL_WIDTH: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Draining,
    Done,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub targets: usize,
    pub requests: usize,
    pub matches: usize,
}

/// Fans one request template out over a target list with a fixed-width pool.
pub struct Dispatcher {
    template: Arc<RequestTemplate>,
    config: Arc<MatchConfig>,
    sink: Arc<ResultSink>,
    mode: ExecutorMode,
    width: usize,
    state: DispatchState,
    pb: ProgressBar,
}

impl Dispatcher {
    pub fn new(
        template: Arc<RequestTemplate>,
        config: Arc<MatchConfig>,
        sink: Arc<ResultSink>,
        trace_redirects: bool,
    ) -> Self {
        let mode = ExecutorMode::select(&template, trace_redirects);
        Self {
            template,
            config,
            sink,
            mode,
            width: POOL_WIDTH,
            state: DispatchState::Idle,
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn mode(&self) -> ExecutorMode {
        self.mode
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn transition(&mut self, next: DispatchState) {
        debug!("dispatcher: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Sends one unit of work per target and returns once all of them have
    /// finished. Submission waits for a free slot when the pool is full.
    /// A body request that cannot be built aborts the whole dispatch.
    pub async fn run(&mut self, targets: &[String]) -> Result<DispatchSummary, ExecutorError> {
        let mut summary = DispatchSummary {
            targets: targets.len(),
            ..DispatchSummary::default()
        };
        let slots = Arc::new(Semaphore::new(self.width));
        let mut units: JoinSet<Result<Attempt, ExecutorError>> = JoinSet::new();

        self.transition(DispatchState::Dispatching);
        for host in targets.iter() {
            while let Some(joined) = units.try_join_next() {
                if let Err(e) = self.absorb(joined, &mut summary) {
                    return self.abort(units, e).await;
                }
            }

            let permit = match Arc::clone(&slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let url = self.template.target_url(host);
            let template = Arc::clone(&self.template);
            let config = Arc::clone(&self.config);
            let sink = Arc::clone(&self.sink);
            let pb = self.pb.clone();
            let mode = self.mode;
            units.spawn(async move {
                let result = executor::execute(mode, &url, &template, &config, &sink).await;
                pb.inc(1);
                drop(permit);
                result
            });
        }

        self.transition(DispatchState::Draining);
        while let Some(joined) = units.join_next().await {
            if let Err(e) = self.absorb(joined, &mut summary) {
                return self.abort(units, e).await;
            }
        }

        self.transition(DispatchState::Done);
        Ok(summary)
    }

    fn absorb(
        &self,
        joined: Result<Result<Attempt, ExecutorError>, tokio::task::JoinError>,
        summary: &mut DispatchSummary,
    ) -> Result<(), ExecutorError> {
        match joined {
            Ok(Ok(attempt)) => {
                summary.requests += attempt.requests;
                summary.matches += attempt.matches;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => {
                error!("worker task failed: {e}");
                Ok(())
            }
        }
    }

    async fn abort(
        &mut self,
        mut units: JoinSet<Result<Attempt, ExecutorError>>,
        e: ExecutorError,
    ) -> Result<DispatchSummary, ExecutorError> {
        error!("{e}");
        units.shutdown().await;
        self.transition(DispatchState::Done);
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::matcher::MatchLocation;
    use crate::tests::mock;

    async fn scratch_sink(dir: &tempfile::TempDir) -> Arc<ResultSink> {
        Arc::new(ResultSink::create(dir.path().join("out")).await)
    }

    fn at_path(url_path: &str) -> Arc<RequestTemplate> {
        Arc::new(RequestTemplate {
            url_path: url_path.to_string(),
            ..RequestTemplate::default()
        })
    }

    fn status_config(code: u16) -> Arc<MatchConfig> {
        Arc::new(MatchConfig::new(MatchLocation::StatusCode, None, ".*", code).unwrap())
    }

    #[tokio::test]
    async fn every_target_gets_exactly_one_attempt() {
        let server = mock::respond_with(ResponseTemplate::new(200)).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;

        // duplicates are kept and dispatched separately
        let targets: Vec<String> = (0..120).map(|_| mock::host(&server)).collect();
        let mut dispatcher =
            Dispatcher::new(at_path("/"), status_config(200), Arc::clone(&sink), false);
        assert_eq!(dispatcher.state(), DispatchState::Idle);

        let summary = dispatcher.run(&targets).await.unwrap();
        assert_eq!(dispatcher.state(), DispatchState::Done);
        assert_eq!(summary.targets, 120);
        assert_eq!(summary.requests, 120);
        assert_eq!(summary.matches, 120);
        assert_eq!(mock::received(&server).await.len(), 120);
        assert_eq!(sink.lines().await.len(), 120);
    }

    #[tokio::test]
    async fn in_flight_units_never_exceed_pool_width() {
        let (host, in_flight) = mock::start_slow(Duration::from_millis(20)).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;

        let targets: Vec<String> = (0..POOL_WIDTH * 4).map(|_| host.clone()).collect();
        let mut dispatcher = Dispatcher::new(at_path(""), status_config(204), sink, false);
        let summary = dispatcher.run(&targets).await.unwrap();

        assert_eq!(summary.requests, POOL_WIDTH * 4);
        assert_eq!(summary.matches, POOL_WIDTH * 4);
        assert_eq!(in_flight.served(), POOL_WIDTH * 4);
        assert!(in_flight.peak() <= POOL_WIDTH);
        assert!(in_flight.peak() > 1);
    }

    #[tokio::test]
    async fn trace_mode_counts_every_hop() {
        let server = MockServer::start().await;
        for (from, to) in [("/start", "/hop"), ("/hop", "/end")] {
            Mock::given(path(from))
                .respond_with(
                    ResponseTemplate::new(302)
                        .insert_header("Location", format!("{}{}", server.uri(), to)),
                )
                .mount(&server)
                .await;
        }
        Mock::given(path("/end"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;

        let mut dispatcher =
            Dispatcher::new(at_path("/start"), status_config(302), Arc::clone(&sink), true);
        assert_eq!(dispatcher.mode(), ExecutorMode::TraceRedirects);
        let summary = dispatcher
            .run(&[mock::host(&server), mock::host(&server)])
            .await
            .unwrap();

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.requests, 6);
        assert_eq!(summary.matches, 4);
        assert_eq!(mock::received(&server).await.len(), 6);
    }

    #[tokio::test]
    async fn body_build_failure_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;
        let template = Arc::new(RequestTemplate {
            url_path: "/login".to_string(),
            body: Some(b"user=admin".to_vec()),
            ..RequestTemplate::default()
        });
        let config = Arc::new(MatchConfig::new(MatchLocation::Body, None, "x", 0).unwrap());

        let mut dispatcher = Dispatcher::new(template, config, sink, false);
        assert_eq!(dispatcher.mode(), ExecutorMode::Body);
        let err = dispatcher
            .run(&["bad host".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::RequestBuild { .. }));
        assert_eq!(dispatcher.state(), DispatchState::Done);
    }

    #[tokio::test]
    async fn blank_line_in_body_run_does_not_abort() {
        let server = mock::respond_with(ResponseTemplate::new(200)).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;
        let template = Arc::new(RequestTemplate {
            body: Some(b"user=admin".to_vec()),
            ..RequestTemplate::default()
        });

        let mut dispatcher = Dispatcher::new(template, status_config(200), Arc::clone(&sink), false);
        let summary = dispatcher
            .run(&[String::new(), mock::host(&server)])
            .await
            .unwrap();

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.requests, 1);
        assert_eq!(sink.lines().await, vec![format!("{}\n", server.uri())]);
    }

    #[tokio::test]
    async fn blank_line_sends_no_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;
        let config = Arc::new(MatchConfig::new(MatchLocation::Default, None, ".*", 0).unwrap());

        let mut dispatcher = Dispatcher::new(at_path("/health"), config, Arc::clone(&sink), false);
        let summary = dispatcher.run(&[String::new()]).await.unwrap();

        assert_eq!(summary.requests, 0);
        assert_eq!(summary.matches, 0);
        assert!(sink.lines().await.is_empty());
        assert_eq!(tokio::fs::read_to_string(sink.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn unbuildable_target_is_skipped_without_body() {
        let server = mock::respond_with(ResponseTemplate::new(200)).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = scratch_sink(&dir).await;

        let mut dispatcher =
            Dispatcher::new(at_path("/"), status_config(200), Arc::clone(&sink), false);
        let summary = dispatcher
            .run(&["bad host".to_string(), mock::host(&server)])
            .await
            .unwrap();
        assert_eq!(summary.requests, 1);
        assert_eq!(sink.lines().await, vec![format!("{}/\n", server.uri())]);
    }
}
