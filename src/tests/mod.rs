
use std::path::{Path, PathBuf};

use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::matcher::MatchLocation;
use crate::runner::{Options, Runner, RunnerError, TargetSource, TemplateSource};
use crate::template::{self, RequestTemplate};

const HEALTH_TEMPLATE: &str = r#"
health:
  method: GET
  url: /health
  protocol: HTTP/1.1
  headers:
    - name: X-Probe
      value: subprobe
"#;

fn health_template() -> RequestTemplate {
    let entries = template::parse_template_document(HEALTH_TEMPLATE, "inline").unwrap();
    RequestTemplate::from_entries(&entries).unwrap()
}

fn options(output: &Path, targets: Vec<String>) -> Options {
    Options {
        template: Some(TemplateSource::Inline(health_template())),
        targets: Some(TargetSource::Inline(targets)),
        output: output.to_path_buf(),
        ..Options::default()
    }
}

fn output_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("output")
}

#[tokio::test]
async fn statuscode_mode_records_only_matching_hosts() {
    let ok = mock::respond_with(ResponseTemplate::new(200)).await;
    let missing = mock::respond_with(ResponseTemplate::new(404)).await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(Options {
        grep_location: MatchLocation::StatusCode,
        grep_status_code: 200,
        ..options(&out, vec![mock::host(&ok), mock::host(&missing)])
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    let written = tokio::fs::read_to_string(&out).await.unwrap();
    assert_eq!(written, format!("{}/health\n", ok.uri()));
    assert_eq!(result.summary.targets, 2);
    assert_eq!(result.summary.matches, 1);
    let seen = mock::received(&ok).await;
    assert_eq!(mock::header(&seen[0], "x-probe"), Some("subprobe"));
}

#[tokio::test]
async fn named_header_mode_writes_the_header_value() {
    let nginx =
        mock::respond_with(ResponseTemplate::new(200).insert_header("Server", "nginx/1.18.0"))
            .await;
    let bare = mock::respond_with(ResponseTemplate::new(200)).await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(Options {
        grep_location: MatchLocation::Headers,
        grep_header: Some("Server".to_string()),
        grep: "nginx".to_string(),
        ..options(&out, vec![mock::host(&nginx), mock::host(&bare)])
    })
    .unwrap();
    runner.run().await.unwrap();

    let written = tokio::fs::read_to_string(&out).await.unwrap();
    assert_eq!(
        written,
        format!("{}/health| nginx/1.18.0\n", nginx.uri())
    );
}

#[tokio::test]
async fn body_mode_matches_response_text() {
    let admin =
        mock::respond_with(ResponseTemplate::new(200).set_body_string("<h1>Admin Panel</h1>"))
            .await;
    let plain = mock::respond_with(ResponseTemplate::new(200).set_body_string("hello")).await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(Options {
        grep_location: MatchLocation::Body,
        grep: r"Admin\s+Panel".to_string(),
        ..options(&out, vec![mock::host(&plain), mock::host(&admin)])
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert_eq!(result.matches, vec![format!("{}/health\n", admin.uri())]);
}

#[tokio::test]
async fn default_mode_writes_placeholder_lines() {
    let server = mock::respond_with(ResponseTemplate::new(204)).await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(options(&out, vec![mock::host(&server)])).unwrap();
    runner.run().await.unwrap();

    let written = tokio::fs::read_to_string(&out).await.unwrap();
    assert_eq!(written, "defaultdefault1");
}

#[tokio::test]
async fn unreachable_hosts_produce_an_empty_output_file() {
    let closed = mock::closed_host().await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(Options {
        grep_location: MatchLocation::StatusCode,
        grep_status_code: 200,
        ..options(&out, vec![closed])
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(tokio::fs::read_to_string(&out).await.unwrap(), "");
}

#[tokio::test]
async fn runs_from_template_and_target_files() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ping"))
        .and(body_string("ping=1"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("request.yml");
    let targets_path = dir.path().join("subdomains.txt");
    let out = output_path(&dir);

    tokio::fs::write(
        &template_path,
        "ping:\n  method: post\n  url: /ping\n  headers:\n    - name: Content-Type\n      value: application/x-www-form-urlencoded\n  body: ping=1\n",
    )
    .await
    .unwrap();
    tokio::fs::write(&targets_path, format!("{}\n", mock::host(&server)))
        .await
        .unwrap();

    let runner = Runner::new(Options {
        template: Some(TemplateSource::FilePath(template_path)),
        targets: Some(TargetSource::FilePath(targets_path)),
        grep_location: MatchLocation::StatusCode,
        grep_status_code: 201,
        output: out.clone(),
        ..Options::default()
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert_eq!(result.summary.requests, 1);
    assert_eq!(
        tokio::fs::read_to_string(&out).await.unwrap(),
        format!("{}/ping\n", server.uri())
    );
    let seen = mock::received(&server).await;
    assert_eq!(seen[0].url.path(), "/ping");
    assert_eq!(
        mock::header(&seen[0], "content-type"),
        Some("application/x-www-form-urlencoded")
    );
}

#[tokio::test]
async fn missing_template_file_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new(Options {
        template: Some(TemplateSource::FilePath(dir.path().join("absent.yml"))),
        targets: Some(TargetSource::Inline(vec!["a.example.com".to_string()])),
        output: output_path(&dir),
        ..Options::default()
    })
    .unwrap();

    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, RunnerError::Template(_)));
}

#[tokio::test]
async fn blank_target_line_is_skipped_without_traffic() {
    let server = mock::respond_with(ResponseTemplate::new(200)).await;
    let dir = tempfile::tempdir().unwrap();
    let out = output_path(&dir);

    let runner = Runner::new(Options {
        grep_location: MatchLocation::StatusCode,
        grep_status_code: 200,
        ..options(&out, vec![String::new(), mock::host(&server)])
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert_eq!(result.summary.targets, 2);
    assert_eq!(result.summary.requests, 1);
    assert_eq!(
        tokio::fs::read_to_string(&out).await.unwrap(),
        format!("{}/health\n", server.uri())
    );
}
