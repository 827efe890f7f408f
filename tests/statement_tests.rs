//! External tests for statement retrieval through relays and contest
//! task-list scraping, using a page shaped like a real AtCoder task.

mod common;

use live_coders::contest::ContestClient;
use live_coders::error::LiveError;
use live_coders::statement::*;

const TASK_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>A - Takahashi</title></head>
<body>
<div id="main-container">
<span class="h2">A - Takahashi</span>
<p>実行時間制限: 2 sec / メモリ制限: 1024 MiB</p>
<div id="task-statement">
<span class="lang">
<span class="lang-ja">
<p>配点 : <var>100</var> 点</p>
<div class="part"><section><h3>問題文</h3><p>整数 <var>N</var> が与えられます。</p></section></div>
<div class="part"><section><h3>制約</h3><ul><li><var>1 \leq N \leq 100</var></li></ul></section></div>
<div class="part"><section><h3>入力</h3><pre><var>N</var></pre></section></div>
</span>
<span class="lang-en">
<p>Score : <var>100</var> points</p>
<div class="part"><section><h3>Constraints</h3><ul><li>N is small</li></ul></section></div>
</span>
</span>
</div>
</div>
</body></html>"#;

const TASK_LIST: &str = r#"<html><body>
<table class="table"><thead><tr><th></th><th>Task Name</th></tr></thead>
<tbody>
<tr><td><a href="/contests/abc300/tasks/abc300_a">A</a></td><td><a href="/contests/abc300/tasks/abc300_a">Takahashi</a></td></tr>
<tr><td><a href="/contests/abc300/tasks/abc300_b">B</a></td><td><a href="/contests/abc300/tasks/abc300_b">Aoki</a></td></tr>
<tr><td><a href="/contests/abc299/tasks/abc299_a">X</a></td><td><a href="/contests/abc299/tasks/abc299_a">Other</a></td></tr>
</tbody></table>
</body></html>"#;

#[test]
fn test_fixture_page_extracts_japanese_statement() {
    let content = extract_content(TASK_PAGE, "https://atcoder.jp/contests/abc300/tasks/abc300_a").unwrap();
    assert!(content.statement.contains("整数 <var>N</var> が与えられます。"));
    assert!(!content.statement.contains("Score"));
    assert_eq!(content.constraints, r"<ul><li><var>1 \leq N \leq 100</var></li></ul>");
    assert_eq!(content.time_limit, "2 sec");
    assert_eq!(content.memory_limit, "1024 MiB");
}

#[test]
fn test_content_serializes_camel_case() {
    let content = extract_content(TASK_PAGE, "u").unwrap();
    let json = serde_json::to_value(&content).unwrap();
    assert_eq!(json["timeLimit"], "2 sec");
    assert_eq!(json["memoryLimit"], "1024 MiB");
}

#[tokio::test]
async fn test_second_proxy_used_when_first_fails() {
    let (base, seen) = common::serve(vec![
        ("/down", common::status(500)),
        ("/up", common::html(TASK_PAGE)),
    ])
    .await;
    let client = StatementClient::new(
        reqwest::Client::new(),
        vec![format!("{base}/down"), format!("{base}/up")],
    );
    let content = client
        .fetch("https://atcoder.jp/contests/abc300/tasks/abc300_a")
        .await
        .unwrap();
    assert_eq!(content.time_limit, "2 sec");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("GET /down?quest=https%3A%2F%2Fatcoder.jp"));
    assert!(seen[1].starts_with("GET /up?quest="));
}

#[tokio::test]
async fn test_page_without_statement_is_extraction_failure() {
    let (base, _) = common::serve(vec![("/up", common::html("<html><body>login</body></html>"))]).await;
    let client = StatementClient::new(reqwest::Client::new(), vec![format!("{base}/up")]);
    let state = client.load("https://atcoder.jp/contests/abc300/tasks/abc300_a").await;
    match state {
        ContentState::Failed { message, official_url } => {
            assert_eq!(message, "問題内容の抽出に失敗しました");
            assert_eq!(official_url, "https://atcoder.jp/contests/abc300/tasks/abc300_a");
        }
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn test_contest_payload_with_first_statement() {
    let (base, _) = common::serve(vec![
        ("/contests/abc300/tasks", common::html(TASK_LIST)),
        ("/contests/abc300/tasks/abc300_a", common::html(TASK_PAGE)),
    ])
    .await;
    let client = ContestClient::new(reqwest::Client::new(), &base);
    let payload = client.fetch_contest("abc300").await.unwrap();

    assert_eq!(payload.contest_id, "abc300");
    let ids: Vec<&str> = payload.problems.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["abc300_a", "abc300_b"]);
    assert_eq!(payload.problems[1].title, "Aoki");

    let first = payload.first_problem.unwrap();
    assert_eq!(first.problem.id, "abc300_a");
    assert!(first.statement.contains("整数"));
    assert!(!first.statement.contains("Score"));
    assert_eq!(first.constraints, r"<li><var>1 \leq N \leq 100</var></li>");
}

#[tokio::test]
async fn test_contest_statement_needs_language_section() {
    let (base, _) = common::serve(vec![
        ("/contests/abc300/tasks", common::html(TASK_LIST)),
        (
            "/contests/abc300/tasks/abc300_a",
            common::html(
                r#"<html><body><div id="task-statement"><p>a<br/>b</p><h3>制約</h3><ul><li>x</li></ul></div></body></html>"#,
            ),
        ),
    ])
    .await;
    let client = ContestClient::new(reqwest::Client::new(), &base);
    let first = client.fetch_contest("abc300").await.unwrap().first_problem.unwrap();
    assert_eq!(first.statement, "");
    assert_eq!(first.constraints, "<li>x</li>");
}

#[tokio::test]
async fn test_contest_first_statement_failure_is_soft() {
    let (base, _) = common::serve(vec![("/contests/abc300/tasks", common::html(TASK_LIST))]).await;
    let client = ContestClient::new(reqwest::Client::new(), &base);
    let payload = client.fetch_contest("abc300").await.unwrap();
    let first = payload.first_problem.unwrap();
    assert!(first.statement.is_empty());
    assert!(first.constraints.is_empty());
}

#[tokio::test]
async fn test_contest_without_rows_is_not_found() {
    let (base, _) = common::serve(vec![(
        "/contests/abc999/tasks",
        common::html("<table><tbody></tbody></table>"),
    )])
    .await;
    let client = ContestClient::new(reqwest::Client::new(), &base);
    let err = client.fetch_contest("abc999").await.unwrap_err();
    assert!(matches!(err, LiveError::NoProblems { .. }));
    assert_eq!(err.status_code(), 404);
}
