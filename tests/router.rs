use std::sync::Arc;

use http::header::{ALLOW, CONTENT_TYPE};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use plumb::middleware::{self, Middleware};
use plumb::{
    Config, Error, ErrorEvent, ErrorMapper, HandlerError, Notifier, RawHandler, Request, Response, RouteError,
    Router, bind, health,
};
use serde::Deserialize;
use validator::Validate;

// ── Helpers ───────────────────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

fn request(method: Method, uri: &str) -> Request {
    http::Request::builder().method(method).uri(uri).body(String::new()).unwrap().into()
}

fn json_request(uri: &str, body: &'static str) -> Request {
    http::Request::post(uri).body(body.to_owned()).unwrap().into()
}

fn json(res: &Response) -> serde_json::Value {
    serde_json::from_slice(res.body()).unwrap()
}

fn recording(name: &'static str, log: &Log) -> Middleware {
    let log = Arc::clone(log);
    middleware::from_fn(name, move |req, next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name.to_owned());
            let res = next.call(req).await;
            log.lock().push(format!("/{name}"));
            res
        }
    })
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(String, u16, String, Option<String>)>>>);

impl Notifier for Recorder {
    fn notify(&self, event: &ErrorEvent<'_>) {
        let id = event.params.and_then(|p| p.get("id")).map(str::to_owned);
        self.0.lock().push((event.uri.to_string(), event.status.as_u16(), event.error.to_string(), id));
    }
}

async fn ok(_req: Request) -> Result<&'static str, Error> {
    Ok("ok")
}

// ── Middleware ordering ───────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_nests_global_then_group_then_route() {
    let log: Log = Arc::default();
    let mut router = Router::new(
        Config::default()
            .with_middleware(recording("g1", &log))
            .with_middleware(recording("g2", &log)),
    );

    {
        let mut api = router.group("/api", &[recording("a", &log)]).unwrap();
        let mut v1 = api.group("/v1", &[recording("b", &log)]).unwrap();
        v1.get("/users", ok, &[recording("r1", &log), recording("r2", &log)]).unwrap();
    }

    let res = router.serve(request(Method::GET, "/api/v1/users")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(
        *log.lock(),
        ["g1", "g2", "a", "b", "r1", "r2", "/r2", "/r1", "/b", "/a", "/g2", "/g1"]
    );
}

#[tokio::test]
async fn ordering_does_not_depend_on_registration_order() {
    let log: Log = Arc::default();
    let mut router = Router::new(Config::default().with_middleware(recording("global", &log)));

    router.get("/plain", ok, &[recording("route", &log)]).unwrap();
    router
        .group("/grouped", &[recording("group", &log)])
        .unwrap()
        .get("/", ok, &[recording("route", &log)])
        .unwrap();
    router.post("/late", ok, &[recording("route", &log)]).unwrap();

    for (method, path, expected) in [
        (Method::GET, "/grouped", vec!["global", "group", "route"]),
        (Method::GET, "/plain", vec!["global", "route"]),
        (Method::POST, "/late", vec!["global", "route"]),
    ] {
        log.lock().clear();
        router.serve(request(method, path)).await;
        let entered: Vec<String> = log.lock().iter().filter(|e| !e.starts_with('/')).cloned().collect();
        assert_eq!(entered, expected, "{path}");
    }
}

#[tokio::test]
async fn routes_report_the_resolved_chain() {
    let log: Log = Arc::default();
    let mut router = Router::new(Config::default().with_middleware(recording("global", &log)));
    router
        .group("/api", &[recording("group", &log)])
        .unwrap()
        .put("/items/{id}", ok, &[recording("route", &log)])
        .unwrap();
    router.any("/echo", ok, &[]).unwrap();

    let routes = router.routes();
    let item = routes.iter().find(|r| r.pattern() == "/api/items/{id}").unwrap();
    assert_eq!(item.method(), Method::PUT);
    let names: Vec<_> = item.middleware().iter().map(Middleware::name).collect();
    assert_eq!(names, ["global", "group", "route"]);

    let echo_methods = routes.iter().filter(|r| r.pattern() == "/echo").count();
    assert_eq!(echo_methods, 9);
}

// ── Parameters ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn params_are_injected_before_the_chain_runs() {
    let seen: Log = Arc::default();
    let peek = {
        let seen = Arc::clone(&seen);
        middleware::from_fn("peek", move |req, next| {
            seen.lock().push(req.param("id").unwrap_or("-").to_owned());
            next.call(req)
        })
    };

    let mut router = Router::new(Config::default().with_middleware(peek));
    router
        .get("/users/{id}", |req: Request| async move { Ok::<_, Error>(req.params().unwrap().int("id")?.to_string()) }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/users/-7")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"-7");
    assert_eq!(*seen.lock(), ["-7"]);

    let res = router.serve(request(Method::GET, "/users/abc")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(json(&res)["message"], "uri param id is not a valid int value: abc");
}

#[tokio::test]
async fn routes_without_variables_get_an_empty_param_map() {
    let mut router = Router::default();
    router
        .get("/static", |req: Request| async move {
            Ok::<_, Error>(format!("{}", req.params().map(|p| p.len()).unwrap_or(usize::MAX)))
        }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/static")).await;
    assert_eq!(res.body(), b"0");
}

// ── Error adaptation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn undeclared_errors_are_500_and_notified() {
    let recorder = Recorder::default();
    let mut router = Router::new(Config::default().with_notifier(recorder.clone()));
    router
        .get("/users/{id}", |_req: Request| async { Err::<(), _>(std::io::Error::other("custom error")) }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/users/7")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(json(&res)["message"], "custom error");

    let notified = recorder.0.lock();
    assert_eq!(
        *notified,
        [("/users/7".to_owned(), 500, "custom error".to_owned(), Some("7".to_owned()))]
    );
}

#[tokio::test]
async fn declared_client_errors_pass_through_unnotified() {
    let recorder = Recorder::default();
    let mut router = Router::new(Config::default().with_notifier(recorder.clone()));
    router
        .get("/", |_req: Request| async { Err::<(), _>(Error::new(StatusCode::NOT_FOUND, "error occurred")) }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(json(&res), serde_json::json!({"code": "not_found", "message": "error occurred"}));
    assert!(recorder.0.lock().is_empty());
}

#[tokio::test]
async fn declared_server_errors_are_notified() {
    let recorder = Recorder::default();
    let mut router = Router::new(Config::default().with_notifier(recorder.clone()));
    router
        .get("/", |_req: Request| async { Err::<(), _>(Error::new(StatusCode::BAD_GATEWAY, "upstream")) }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(recorder.0.lock().len(), 1);
}

#[tokio::test]
async fn custom_mapper_overrides_and_delegates() {
    let recorder = Recorder::default();
    let mapper = ErrorMapper::new(|err, default| {
        if err.to_string() == "something went wrong" {
            return HandlerError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"message": "something went wrong", "custom": true}),
                false,
            );
        }
        default(err)
    });

    let mut router = Router::new(Config::default().with_error_mapper(mapper).with_notifier(recorder.clone()));
    router
        .get("/custom", |_req: Request| async { Err::<(), _>(std::io::Error::other("something went wrong")) }, &[])
        .unwrap()
        .get("/default", |_req: Request| async { Err::<(), _>(std::io::Error::other("other")) }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/custom")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&res)["custom"], true);
    assert!(recorder.0.lock().is_empty());

    let res = router.serve(request(Method::GET, "/default")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(recorder.0.lock().len(), 1);
}

#[tokio::test]
async fn no_content_errors_have_no_body() {
    let mut router = Router::default();
    router
        .delete("/", |_req: Request| async { Err::<(), _>(Error::new(StatusCode::NO_CONTENT, "ignored")) }, &[])
        .unwrap();

    let res = router.serve(request(Method::DELETE, "/")).await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
    assert!(res.body().is_empty());
    assert!(res.headers().get(CONTENT_TYPE).is_none());
}

#[tokio::test]
async fn handler_panics_become_notified_500s() {
    let recorder = Recorder::default();
    let mut router = Router::new(Config::default().with_notifier(recorder.clone()));
    router
        .get("/panic", |_req: Request| async {
            if true {
                panic!("handler blew up");
            }
            Ok::<_, Error>(())
        }, &[])
        .unwrap();

    let res = router.serve(request(Method::GET, "/panic")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&res)["message"], "handler blew up");
    assert_eq!(recorder.0.lock()[0].2, "handler blew up");
}

#[tokio::test]
async fn middleware_panics_are_caught_at_dispatch() {
    let recorder = Recorder::default();
    let boom = middleware::from_fn("boom", |_req, _next| async {
        if true {
            panic!("middleware blew up");
        }
        Response::status(StatusCode::OK)
    });
    let mut router = Router::new(Config::default().with_middleware(boom).with_notifier(recorder.clone()));
    router.get("/", ok, &[]).unwrap();

    let res = router.serve(request(Method::GET, "/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(recorder.0.lock().len(), 1);
}

// ── Binding through the router ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct Payload {
    #[validate(length(min = 1))]
    field1: String,
}

async fn create(mut req: Request) -> Result<String, Error> {
    let payload: Payload = bind(&mut req).await?;
    Ok(payload.field1)
}

#[tokio::test]
async fn bound_body_without_content_type_succeeds() {
    let mut router = Router::default();
    router.post("/", create, &[]).unwrap();

    let res = router.serve(json_request("/", r#"{"field1":"1"}"#)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"1");
}

#[tokio::test]
async fn validation_failure_is_422_and_not_notified() {
    let recorder = Recorder::default();
    let mut router = Router::new(Config::default().with_notifier(recorder.clone()));
    router.post("/", create, &[]).unwrap();

    let res = router.serve(json_request("/", r#"{"field1":""}"#)).await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json(&res)["message"].as_str().unwrap().contains("field1"));
    assert!(recorder.0.lock().is_empty());
}

#[tokio::test]
async fn empty_body_is_400() {
    let mut router = Router::default();
    router.post("/", create, &[]).unwrap();

    let res = router.serve(json_request("/", "")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(json(&res)["message"], "request body is empty");
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn verb_shortcuts_register_their_method() {
    let mut router = Router::default();
    router
        .get("/r", ok, &[])
        .unwrap()
        .head("/r", ok, &[])
        .unwrap()
        .options("/r", ok, &[])
        .unwrap()
        .post("/r", ok, &[])
        .unwrap()
        .put("/r", ok, &[])
        .unwrap()
        .patch("/r", ok, &[])
        .unwrap()
        .delete("/r", ok, &[])
        .unwrap()
        .trace("/r", ok, &[])
        .unwrap();

    for method in [
        Method::GET,
        Method::HEAD,
        Method::OPTIONS,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::TRACE,
    ] {
        let res = router.serve(request(method.clone(), "/r")).await;
        assert_eq!(res.status_code(), StatusCode::OK, "{method}");
    }
}

#[tokio::test]
async fn any_matches_every_method() {
    let mut router = Router::default();
    router
        .any("/anything", |req: Request| async move { Ok::<_, Error>(req.method().to_string()) }, &[])
        .unwrap();

    for method in [Method::GET, Method::POST, Method::DELETE, Method::CONNECT] {
        let res = router.serve(request(method.clone(), "/anything")).await;
        assert_eq!(res.body(), method.as_str().as_bytes());
    }
}

#[tokio::test]
async fn group_paths_are_normalised() {
    let mut router = Router::default();
    router.group("/api/", &[]).unwrap().get("//users/", ok, &[]).unwrap();

    assert_eq!(router.routes()[0].pattern(), "/api/users");
    let res = router.serve(request(Method::GET, "/api/users")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[test]
fn malformed_patterns_fail_at_registration() {
    let mut router = Router::default();
    assert!(matches!(router.get("", ok, &[]), Err(RouteError::EmptyPattern)));
    assert!(matches!(router.get("users", ok, &[]), Err(RouteError::Malformed { .. })));
    assert!(matches!(router.group("/a/../b", &[]), Err(RouteError::Malformed { .. })));

    let mut group = router.group("/api", &[]).unwrap();
    assert!(matches!(group.get("", ok, &[]), Err(RouteError::EmptyPattern)));
}

// ── Fallbacks and built-in endpoints ─────────────────────────────────────────

#[tokio::test]
async fn unknown_paths_are_json_404s() {
    let router = Router::default();
    let res = router.serve(request(Method::GET, "/nope")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(json(&res)["code"], "not_found");
}

#[tokio::test]
async fn custom_not_found_handler() {
    let not_found = RawHandler::from_fn(|_req| async { Response::builder().status(StatusCode::NOT_FOUND).text("gone") });
    let router = Router::new(Config::default().with_not_found(not_found));

    let res = router.serve(request(Method::GET, "/nope")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), b"gone");
}

#[tokio::test]
async fn wrong_method_is_405_with_allow() {
    let mut router = Router::default();
    router.get("/users", ok, &[]).unwrap().post("/users", ok, &[]).unwrap();

    let res = router.serve(request(Method::DELETE, "/users")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "GET, POST");
}

#[tokio::test]
async fn health_endpoints_bypass_global_middleware() {
    let deny = middleware::from_fn("deny", |_req, _next| async { Response::status(StatusCode::FORBIDDEN) });
    let mut router = Router::new(
        Config::default()
            .with_middleware(deny)
            .with_liveness(health::liveness())
            .with_readiness(health::readiness()),
    );
    router.get("/private", ok, &[]).unwrap();

    assert_eq!(router.serve(request(Method::GET, "/liveness")).await.status_code(), StatusCode::OK);
    assert_eq!(router.serve(request(Method::GET, "/readiness")).await.body(), b"ready");
    assert_eq!(router.serve(request(Method::GET, "/private")).await.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_endpoints_are_opt_in() {
    let router = Router::default();
    assert_eq!(router.serve(request(Method::GET, "/liveness")).await.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(router.serve(request(Method::GET, "/debug/vars")).await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profiler_mounts_debug_endpoints() {
    let router = Router::new(Config::default().with_profiler(true));

    let res = router.serve(request(Method::GET, "/debug")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res)["endpoints"][0], "/debug/vars");

    let res = router.serve(request(Method::GET, "/debug/vars")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json(&res)["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn failed_any_registers_nothing() {
    let mut router = Router::default();
    router.post("/x", ok, &[]).unwrap();
    assert!(matches!(router.any("/x", ok, &[]), Err(RouteError::Insert { .. })));

    let res = router.serve(request(Method::GET, "/x")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "POST");

    let registered: Vec<_> = router.routes().iter().map(|r| (r.method().clone(), r.pattern().to_owned())).collect();
    assert_eq!(registered, [(Method::POST, "/x".to_owned())]);
}

#[tokio::test]
async fn built_in_paths_cannot_be_registered_twice() {
    let mut router = Router::new(Config::default().with_liveness(health::liveness()));
    assert!(matches!(router.get("/liveness", ok, &[]), Err(RouteError::Insert { .. })));
}
