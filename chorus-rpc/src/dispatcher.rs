//! The RPC dispatcher (§4.6): a dynamic method registry that replaces the
//! reference server's hardcoded `match action { ... }` with a lookup table,
//! gated by a predicate check and a rate-limit check ahead of invocation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{error, warn};

use chorus_net::{Connection, RateLimiter};
use chorus_types::{ErrorCode, Predicate, RpcEnvelope};
use chorus_utils::PeriodError;

use crate::error::RegistrationError;

/// What the dispatcher does after a `RATE_LIMITED` rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u64,
    pub period: Duration,
    pub disconnect_on_exceed: bool,
}

impl RateLimitPolicy {
    /// Build a policy from a human period string like `"10s"` or `"1m"`
    /// (§4.3), rather than a raw [`Duration`].
    pub fn from_period_str(
        limit: u64,
        period: &str,
        disconnect_on_exceed: bool,
    ) -> Result<Self, PeriodError> {
        Ok(Self {
            limit,
            period: chorus_utils::parse_period(period)?,
            disconnect_on_exceed,
        })
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Value> + Send>>;
type HandlerFn = Arc<dyn Fn(Arc<Connection>, Vec<Value>, Map<String, Value>) -> HandlerFuture + Send + Sync>;

/// A registered RPC method: its access predicate, optional rate limit, and
/// the handler itself.
struct MethodSpec {
    requires: Option<Predicate>,
    rate_limit: Option<RateLimitPolicy>,
    handler: HandlerFn,
}

/// Looks up incoming RPC requests by alias, enforces the predicate and
/// rate-limit gates, and spawns the handler so a slow call never blocks the
/// connection's read loop.
#[derive(Default)]
pub struct Dispatcher {
    methods: DashMap<String, Arc<MethodSpec>>,
    rate_limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Register a handler under `alias`. Duplicate aliases are a hard error.
    pub fn register<F, Fut>(
        &self,
        alias: impl Into<String>,
        requires: Option<Predicate>,
        rate_limit: Option<RateLimitPolicy>,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(Arc<Connection>, Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let alias = alias.into();
        if self.methods.contains_key(&alias) {
            return Err(RegistrationError::DuplicateAlias(alias));
        }
        let spec = MethodSpec {
            requires,
            rate_limit,
            handler: Arc::new(move |conn, args, kwargs| Box::pin(handler(conn, args, kwargs))),
        };
        self.methods.insert(alias, Arc::new(spec));
        Ok(())
    }

    pub fn is_registered(&self, alias: &str) -> bool {
        self.methods.contains_key(alias)
    }

    /// Forget every bucket belonging to a closed connection.
    pub fn forget_connection(&self, conn: &Connection) {
        self.rate_limiter.remove_connection(conn.id());
    }

    /// Handle one incoming RPC request packet. Always enqueues exactly one
    /// response on `conn` (unless the connection has already closed).
    pub async fn dispatch(&self, conn: Arc<Connection>, envelope: RpcEnvelope) {
        let RpcEnvelope::Request {
            call_id,
            method,
            args,
            kwargs,
        } = envelope
        else {
            warn!("dispatch called with a non-request envelope");
            return;
        };

        let Some(spec) = self.methods.get(&method).map(|e| e.clone()) else {
            self.respond(&conn, RpcEnvelope::failure(call_id, ErrorCode::MethodNotFound))
                .await;
            return;
        };

        if let Some(pred) = &spec.requires {
            if !pred.eval(conn.as_ref()) {
                self.respond(&conn, RpcEnvelope::failure(call_id, ErrorCode::AccessDenied))
                    .await;
                return;
            }
        }

        if let Some(policy) = &spec.rate_limit {
            let admitted = self
                .rate_limiter
                .check(conn.id(), &method, policy.limit, policy.period);
            if !admitted {
                self.respond(&conn, RpcEnvelope::failure(call_id, ErrorCode::RateLimited))
                    .await;
                if policy.disconnect_on_exceed {
                    conn.close();
                }
                return;
            }
        }

        let handler = spec.handler.clone();
        let task_conn = conn.clone();
        let join = tokio::spawn(async move { (handler)(task_conn, args, kwargs).await });

        match join.await {
            Ok(value) => {
                self.respond(&conn, RpcEnvelope::success(call_id, value)).await;
            }
            Err(join_error) => {
                error!(method = %method, error = %join_error, "RPC handler panicked");
                self.respond(&conn, RpcEnvelope::failure(call_id, ErrorCode::InternalError))
                    .await;
            }
        }
    }

    async fn respond(&self, conn: &Connection, envelope: RpcEnvelope) {
        let _ = conn.send(chorus_types::Packet::for_rpc(envelope)).await;
    }
}
