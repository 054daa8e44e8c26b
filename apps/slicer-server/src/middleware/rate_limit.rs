//! Rate limiting middleware.
//!
//! Wraps a route, charges the caller's identity against one quota namespace
//! and either forwards the request with `X-RateLimit-*` headers or answers
//! 429. Faults inside the gate never reach the caller as a rate limit
//! decision: they are logged and counted, then the request is forwarded
//! (fail open) or refused with 503 (fail closed).

use std::any::Any;
use std::future::{Ready, ready};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::{
    Error, HttpMessage, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use slicer_core::domain::{ClientIdentity, Namespace, RateDecision};
use slicer_core::ports::{RateLimitError, RateLimiter};
use slicer_shared::{ErrorResponse, RateLimitedResponse};

use crate::observability::RequestId;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Fault policy shared by every gate in the process.
#[derive(Debug, Clone)]
pub struct GateSettings {
    fail_open: bool,
    faults: Arc<AtomicU64>,
}

impl GateSettings {
    pub fn new(fail_open: bool) -> Self {
        Self {
            fail_open,
            faults: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Gate faults observed since startup.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Resolve the caller identity from `X-Forwarded-For` or the peer address.
pub fn client_identity(req: &HttpRequest) -> ClientIdentity {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());

    ClientIdentity::resolve(forwarded, req.peer_addr().map(|addr| addr.ip()))
}

/// Rate limiting middleware factory.
pub struct RateLimitGate {
    limiter: Arc<dyn RateLimiter>,
    namespace: Namespace,
    settings: GateSettings,
}

impl RateLimitGate {
    pub fn new(limiter: Arc<dyn RateLimiter>, namespace: Namespace, settings: GateSettings) -> Self {
        Self {
            limiter,
            namespace,
            settings,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitGateService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            namespace: self.namespace,
            settings: self.settings.clone(),
        }))
    }
}

pub struct RateLimitGateService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    namespace: Namespace,
    settings: GateSettings,
}

impl<S, B> Service<ServiceRequest> for RateLimitGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let namespace = self.namespace;
        let settings = self.settings.clone();

        Box::pin(async move {
            let checked = AssertUnwindSafe(check(limiter.as_ref(), namespace, req.request()))
                .catch_unwind()
                .await;

            let fault = match checked {
                Ok(Ok((identity, decision))) if !decision.allowed => {
                    tracing::warn!(
                        namespace = %namespace,
                        identity = %identity,
                        retry_after = decision.retry_after_secs,
                        "Rate limit exceeded"
                    );
                    return Ok(reject(req, &decision).map_into_right_body());
                }
                Ok(Ok((_, decision))) => {
                    let mut res = service.call(req).await?;
                    apply_headers(res.headers_mut(), &decision);
                    return Ok(res.map_into_left_body());
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("rate limiter panicked: {}", panic_message(panic.as_ref())),
            };

            let total = settings.faults.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                namespace = %namespace,
                error = %fault,
                fail_open = settings.fail_open,
                gate_faults_total = total,
                "Rate limit gate failed"
            );

            if settings.fail_open {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            } else {
                Ok(unavailable(req).map_into_right_body())
            }
        })
    }
}

async fn check(
    limiter: &dyn RateLimiter,
    namespace: Namespace,
    req: &HttpRequest,
) -> Result<(ClientIdentity, RateDecision), RateLimitError> {
    let identity = client_identity(req);
    let decision = limiter.check(namespace, &identity).await?;
    Ok((identity, decision))
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(decision.limit));
    headers.insert(HeaderName::from_static(REMAINING_HEADER), HeaderValue::from(decision.remaining));
    headers.insert(HeaderName::from_static(RESET_HEADER), HeaderValue::from(decision.reset_timestamp()));
}

fn reject(req: ServiceRequest, decision: &RateDecision) -> ServiceResponse {
    let retry_after = decision.retry_after_secs.unwrap_or(1);

    let mut response = HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, retry_after.to_string()))
        .json(RateLimitedResponse::new(retry_after));
    apply_headers(response.headers_mut(), decision);

    let (http_req, _payload) = req.into_parts();
    ServiceResponse::new(http_req, response)
}

fn unavailable(req: ServiceRequest) -> ServiceResponse {
    let mut error = ErrorResponse::service_unavailable("Rate limiting is temporarily unavailable");
    if let Some(request_id) = req.extensions().get::<RequestId>() {
        error = error.with_request_id(request_id.as_str());
    }

    let response = HttpResponse::ServiceUnavailable().json(error);
    let (http_req, _payload) = req.into_parts();
    ServiceResponse::new(http_req, response)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
