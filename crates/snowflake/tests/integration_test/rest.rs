//! RestConnector against an in-process server speaking the v1 session API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use snowpoll_snowflake::*;

const TOKEN: &str = "tok-123";
const ASYNC_ID: &str = "01b2-0000-async";
const SLOW_ID: &str = "01b2-0000-slow";
const SLOW_SQL: &str = "select system$wait(5)";

#[derive(Default)]
struct Fake {
    base_url: String,
    reject_login: bool,
    login_params: HashMap<String, String>,
    /// `(sqlText, asyncExec)` for every statement received.
    statements: Vec<(String, bool)>,
    closes: u32,
    /// In-progress answers still to give for the slow statement.
    still_running: u32,
    result_requests: u32,
}

type Shared = Arc<Mutex<Fake>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Snowflake Token=\"{TOKEN}\""))
        .unwrap_or(false)
}

async fn login(
    State(fake): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut f = fake.lock().unwrap();
    f.login_params = params;
    if f.reject_login || body["data"]["PASSWORD"] != "secret" {
        return Json(json!({
            "data": null,
            "code": "390100",
            "message": "Incorrect username or password was specified.",
            "success": false
        }));
    }
    Json(json!({
        "data": {"token": TOKEN, "masterToken": "master"},
        "code": null,
        "message": null,
        "success": true
    }))
}

async fn query_request(
    State(fake): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let sql = body["sqlText"].as_str().unwrap_or_default().to_string();
    let is_async = body["asyncExec"].as_bool().unwrap_or(false);
    let mut f = fake.lock().unwrap();
    f.statements.push((sql.clone(), is_async));

    if is_async {
        return Ok(Json(json!({
            "data": {"queryId": ASYNC_ID, "getResultUrl": format!("/queries/{ASYNC_ID}/result")},
            "code": "333334",
            "message": "Asynchronous execution in progress.",
            "success": true
        })));
    }

    if sql == SLOW_SQL {
        return Ok(Json(in_progress()));
    }

    let data = if sql.starts_with("use warehouse") {
        json!({
            "queryId": "01b2-0000-use",
            "rowtype": [{"name": "status", "type": "text"}],
            "rowset": [["Statement executed successfully."]],
            "queryResultFormat": "json"
        })
    } else if sql.contains("query_history") {
        json!({
            "queryId": "01b2-0000-status",
            "rowtype": [
                {"name": "EXECUTION_STATUS", "type": "text"},
                {"name": "COMPILATION_TIME / 1000", "type": "fixed"},
                {"name": "EXECUTION_TIME / 1000", "type": "fixed"}
            ],
            "rowset": [["SUCCESS", "0.120", "2.500"]],
            "queryResultFormat": "json"
        })
    } else if sql.contains("RESULT_SCAN") {
        json!({
            "queryId": "01b2-0000-scan",
            "rowtype": [{"name": "ID", "type": "fixed"}, {"name": "NAME", "type": "text"}],
            "rowset": [["1", "alice"], ["2", null]],
            "queryResultFormat": "json",
            "chunks": [{"url": format!("{}/chunks/0", f.base_url), "rowCount": 1}],
            "qrmk": "a2V5"
        })
    } else {
        return Ok(Json(json!({
            "data": {"queryId": "01b2-0000-err"},
            "code": "002003",
            "message": "SQL compilation error: Object does not exist",
            "success": false
        })));
    };

    Ok(Json(json!({"data": data, "code": null, "message": null, "success": true})))
}

fn in_progress() -> Value {
    json!({
        "data": {"queryId": SLOW_ID, "getResultUrl": format!("/queries/{SLOW_ID}/result")},
        "code": "333333",
        "message": "Query execution in progress.",
        "success": true
    })
}

async fn query_result(
    State(fake): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) || id != SLOW_ID {
        return Err(StatusCode::NOT_FOUND);
    }
    let mut f = fake.lock().unwrap();
    f.result_requests += 1;
    if f.still_running > 0 {
        f.still_running -= 1;
        return Ok(Json(in_progress()));
    }
    Ok(Json(json!({
        "data": {
            "queryId": SLOW_ID,
            "rowtype": [{"name": "WAITED", "type": "text"}],
            "rowset": [["waited 5 seconds"]],
            "queryResultFormat": "json"
        },
        "code": null,
        "message": null,
        "success": true
    })))
}

async fn chunk(Path(idx): Path<u32>, headers: HeaderMap) -> Result<String, StatusCode> {
    let key = headers
        .get("x-amz-server-side-encryption-customer-key")
        .and_then(|v| v.to_str().ok());
    if idx != 0 || key != Some("a2V5") {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok("[\"3\",\"carol\"]".to_string())
}

async fn session(
    State(fake): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) || params.get("delete").map(String::as_str) != Some("true") {
        return Err(StatusCode::BAD_REQUEST);
    }
    fake.lock().unwrap().closes += 1;
    Ok(Json(json!({"data": null, "code": null, "message": null, "success": true})))
}

async fn start_server(reject_login: bool) -> (Shared, SnowflakeConfig) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let fake: Shared = Arc::new(Mutex::new(Fake {
        base_url: base_url.clone(),
        reject_login,
        ..Default::default()
    }));

    let app = Router::new()
        .route("/session/v1/login-request", post(login))
        .route("/queries/v1/query-request", post(query_request))
        .route("/queries/{id}/result", get(query_result))
        .route("/chunks/{idx}", get(chunk))
        .route("/session", post(session))
        .with_state(Arc::clone(&fake));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = SnowflakeConfig {
        account: "xy12345.eu-west-1".into(),
        user: "analyst".into(),
        password: "secret".into(),
        role: Some("REPORTING".into()),
        default_warehouse: "WH_M".into(),
        async_warehouse: "WH_2XL".into(),
        status_warehouse: "WH_XSM".into(),
        database: "SALES".into(),
        schema: "PUBLIC".into(),
        host: Some(base_url),
        poll_delay_seconds: 1,
        timeout_seconds: 60,
    };
    (fake, config)
}

#[tokio::test]
async fn test_query_round_trip_over_rest() {
    let (fake, config) = start_server(false).await;
    let runner = QueryRunner::from_config(config).unwrap();

    let report = runner
        .execute("select id, name from customers", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats.handle.as_str(), ASYNC_ID);
    assert_eq!(report.stats.polls, 1);
    let table = report.into_table().expect("rows");
    assert_eq!(table.columns, vec!["ID", "NAME"]);
    assert_eq!(
        table.rows,
        vec![
            vec![Some("1".to_string()), Some("alice".to_string())],
            vec![Some("2".to_string()), None],
            vec![Some("3".to_string()), Some("carol".to_string())],
        ]
    );

    let f = fake.lock().unwrap();
    assert_eq!(f.login_params.get("databaseName").map(String::as_str), Some("SALES"));
    assert_eq!(f.login_params.get("schemaName").map(String::as_str), Some("PUBLIC"));
    assert_eq!(f.login_params.get("roleName").map(String::as_str), Some("REPORTING"));

    let sent: Vec<&str> = f.statements.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(sent[0], "use warehouse WH_2XL");
    assert_eq!(sent[1], "select id, name from customers");
    assert!(sent.iter().any(|s| s.contains("RESULT_SCAN('01b2-0000-async')")));
    // Only the user statement is submitted asynchronously.
    let async_flags: Vec<bool> = f.statements.iter().map(|(_, a)| *a).collect();
    assert_eq!(async_flags.iter().filter(|a| **a).count(), 1);
    assert!(async_flags[1]);
    assert_eq!(f.closes, 1);
}

#[tokio::test]
async fn test_rejected_login_is_auth_error() {
    let (fake, config) = start_server(true).await;
    let runner = QueryRunner::from_config(config).unwrap();

    let err = runner
        .execute("select 1", &QueryOptions::default())
        .await
        .unwrap_err();

    match err {
        SnowflakeError::Auth { code, message } => {
            assert_eq!(code.as_deref(), Some("390100"));
            assert!(message.contains("Incorrect username or password"));
        }
        other => panic!("expected Auth, got {other:?}"),
    }
    assert!(fake.lock().unwrap().statements.is_empty());
    assert_eq!(fake.lock().unwrap().closes, 0);

    assert!(runner.query("select 1", &QueryOptions::default()).await.is_none());
}

#[tokio::test]
async fn test_statement_error_surfaces_api_code() {
    let (fake, config) = start_server(false).await;
    let mut conn = RestConnector::new(config).unwrap().connect().await.unwrap();

    let err = conn
        .execute("select * from nowhere", ExecMode::Sync)
        .await
        .unwrap_err();
    match err {
        SnowflakeError::Api { code, message } => {
            assert_eq!(code, "002003");
            assert!(message.contains("does not exist"));
        }
        other => panic!("expected Api, got {other:?}"),
    }

    conn.close().await.unwrap();
    // A second close is a no-op.
    conn.close().await.unwrap();
    assert_eq!(fake.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    let (_fake, mut config) = start_server(false).await;
    // Nothing listens on the discard port.
    config.host = Some("http://127.0.0.1:9".into());

    let result = RestConnector::new(config).unwrap().connect().await;
    assert!(matches!(result, Err(SnowflakeError::Connection(_))));
}

#[tokio::test]
async fn test_sync_statement_follows_result_url_until_done() {
    let (fake, config) = start_server(false).await;
    fake.lock().unwrap().still_running = 3;
    let mut conn = RestConnector::new(config).unwrap().connect().await.unwrap();

    let result = conn.execute(SLOW_SQL, ExecMode::Sync).await.unwrap();

    assert_eq!(result.query_id, SLOW_ID);
    assert_eq!(result.columns, vec!["WAITED"]);
    assert_eq!(result.rows, vec![vec![Some("waited 5 seconds".to_string())]]);
    // Three in-progress answers, then the finished one.
    assert_eq!(fake.lock().unwrap().result_requests, 4);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_sync_statement_gives_up_after_result_timeout() {
    let (fake, config) = start_server(false).await;
    fake.lock().unwrap().still_running = u32::MAX;
    let mut conn = RestConnector::new(config)
        .unwrap()
        .with_result_timeout(Duration::from_millis(500))
        .connect()
        .await
        .unwrap();

    let err = conn.execute(SLOW_SQL, ExecMode::Sync).await.unwrap_err();

    match err {
        SnowflakeError::Api { code, message } => {
            assert_eq!(code, "333333");
            assert!(message.contains("still running"), "{message}");
        }
        other => panic!("expected Api, got {other:?}"),
    }
    // Backoff keeps the request count small over half a second.
    let requests = fake.lock().unwrap().result_requests;
    assert!((1..=6).contains(&requests), "{requests} result requests");
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_async_submission_does_not_wait_for_result() {
    let (fake, config) = start_server(false).await;
    fake.lock().unwrap().still_running = u32::MAX;
    let mut conn = RestConnector::new(config).unwrap().connect().await.unwrap();

    let result = conn.execute(SLOW_SQL, ExecMode::Async).await.unwrap();

    assert_eq!(result.query_id, ASYNC_ID);
    assert_eq!(fake.lock().unwrap().result_requests, 0);
    conn.close().await.unwrap();
}
