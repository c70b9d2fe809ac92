//! Minimal plumb service: JSON CRUD endpoints, a route group with its own
//! middleware, health probes and graceful shutdown.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/api/users/42
//!   curl -X POST http://localhost:8080/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","email":"alice@example.com"}'
//!   curl -X DELETE http://localhost:8080/api/users/42
//!   curl http://localhost:8080/liveness
//!
//! Stop with Ctrl-C; in-flight requests are allowed to finish.

use std::time::Duration;

use http::StatusCode;
use plumb::{Config, Error, Json, Request, Router, Runner, Timeouts, bind, health, middleware, runner};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use validator::Validate;

#[derive(Deserialize, Serialize, Validate)]
struct User {
    #[validate(length(min = 1))]
    name: String,
    #[validate(email)]
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut router = Router::new(
        Config::default()
            .with_liveness(health::liveness())
            .with_readiness(health::readiness())
            .with_profiler(true)
            .with_middleware(middleware::trace())
            .with_middleware(middleware::forward_headers()),
    );

    router
        .group("/api", &[middleware::accept_json()])?
        .get("/users/{id}", get_user, &[])?
        .post("/users", create_user, &[])?
        .delete("/users/{id}", delete_user, &[])?;

    let timeouts = Timeouts {
        read: Duration::from_secs(5),
        write: Duration::from_secs(10),
        ..Timeouts::default()
    };
    let listener = runner::bind_from_env().await?;
    Runner::new(timeouts).run(listener, router).await?;
    Ok(())
}

// GET /api/users/{id}
async fn get_user(req: Request) -> Result<Json<User>, Error> {
    let id = req.params().map_or(Ok(0), |p| p.uint("id"))?;
    if id != 42 {
        return Err(Error::new(StatusCode::NOT_FOUND, format!("user {id} not found")));
    }
    Ok(Json(User { name: "alice".into(), email: "alice@example.com".into() }))
}

// POST /api/users: 415 for non-JSON, 400 for malformed JSON, 422 for invalid fields.
async fn create_user(mut req: Request) -> Result<(StatusCode, Json<User>), Error> {
    let user: User = bind(&mut req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// DELETE /api/users/{id}: 204 No Content
async fn delete_user(_req: Request) -> Result<StatusCode, Error> {
    Ok(StatusCode::NO_CONTENT)
}
