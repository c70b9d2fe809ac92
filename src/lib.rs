//! # plumb
//!
//! The request-dispatch plumbing of an HTTP service: routing, middleware,
//! error-to-response mapping, body binding and a graceful server lifecycle.
//! Wire-level HTTP is hyper's job and route matching is [`matchit`]'s. This
//! crate is the contract layered on top of them.
//!
//! ## The contract
//!
//! - **Handlers** are `async fn(Request) -> Result<impl IntoResponse, impl Into<BoxError>>`.
//!   Returning an [`Error`] declares the status. Anything else is a 500.
//! - **Middleware** wraps a [`RawHandler`] (request in, response out, never
//!   fails). Every route runs `global ∘ group ∘ route ∘ handler`.
//! - **Errors** become JSON responses in exactly one place, the [`Router`],
//!   through an [`ErrorMapper`]. Server errors are reported to a [`Notifier`].
//! - **Shutdown** on SIGINT / SIGTERM stops accepting, drains in-flight
//!   requests, and force-closes after [`Timeouts::shutdown`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use plumb::{Config, Error, Json, Request, Router, Runner, Timeouts, bind, health, middleware, runner};
//! use serde::{Deserialize, Serialize};
//! use validator::Validate;
//!
//! #[derive(Deserialize, Serialize, Validate)]
//! struct User {
//!     #[validate(length(min = 1))]
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new(
//!         Config::default()
//!             .with_liveness(health::liveness())
//!             .with_middleware(middleware::trace()),
//!     );
//!     router
//!         .get("/users/{id}", get_user, &[])?
//!         .post("/users", create_user, &[middleware::accept_json()])?;
//!
//!     let listener = runner::bind_from_env().await?;
//!     Runner::new(Timeouts::default()).run(listener, router).await?;
//!     Ok(())
//! }
//!
//! async fn get_user(req: Request) -> Result<Json<User>, Error> {
//!     let id = req.params().map_or(Ok(0), |p| p.uint("id"))?;
//!     if id != 42 {
//!         return Err(Error::new(StatusCode::NOT_FOUND, format!("user {id} not found")));
//!     }
//!     Ok(Json(User { name: "alice".into() }))
//! }
//!
//! async fn create_user(mut req: Request) -> Result<(StatusCode, Json<User>), Error> {
//!     let user: User = bind(&mut req).await?;
//!     Ok((StatusCode::CREATED, Json(user)))
//! }
//! ```

mod bind;
mod config;
mod error;
mod group;
mod handler;
mod mapper;
mod params;
mod request;
mod response;
mod router;
mod telemetry;

pub mod health;
pub mod middleware;
pub mod runner;

pub use bind::{bind, decode};
pub use config::Config;
pub use error::{BoxError, DynError, Error, RouteError, ServeError};
pub use group::RouteGroup;
pub use handler::{BoxFuture, Handler, RawHandler};
pub use mapper::{DefaultMapper, ErrorMapper, HandlerError, default_error_mapper};
pub use params::{ParamError, UriParams};
pub use request::{Body, Request};
pub use response::{IntoResponse, Json, Response, ResponseBuilder, respond_bytes, respond_json, respond_reader};
pub use router::{Route, Router};
pub use runner::{RunState, Runner, Timeouts, bind_from_env, load_tls_config, run, run_tls};
pub use telemetry::{ErrorEvent, Notifier, TracingNotifier};
