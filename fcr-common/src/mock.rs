//! Scripted in-process transport for tests.
//!
//! Routes are keyed by method and exact path. Each route holds a queue of
//! responses: responses are consumed in order and the last one repeats, so a
//! route can model a value that converges ("starting", "starting", "started").
//! Unrouted requests answer 404. Every request is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::client::{HttpRequest, Method, RawResponse, Transport};
use crate::errors::TransportError;

type Handler = Box<dyn Fn(&HttpRequest) -> RawResponse + Send + Sync>;

enum Route {
    Queue(VecDeque<RawResponse>),
    Handler(Handler),
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response to the route's queue.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let key = (method, path.to_string());
        match routes.get_mut(&key) {
            Some(Route::Queue(queue)) => queue.push_back(RawResponse::new(status, body)),
            _ => {
                routes.insert(
                    key,
                    Route::Queue(VecDeque::from([RawResponse::new(status, body)])),
                );
            }
        }
    }

    /// Answer a route with a closure, replacing any queued responses.
    pub fn handle(
        &self,
        method: Method,
        path: &str,
        handler: impl Fn(&HttpRequest) -> RawResponse + Send + Sync + 'static,
    ) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert((method, path.to_string()), Route::Handler(Box::new(handler)));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded requests matching method and path.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let response = match routes.get_mut(&(request.method, request.path.clone())) {
            Some(Route::Handler(handler)) => (**handler)(request),
            Some(Route::Queue(queue)) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| RawResponse::new(404, "{}")),
            Some(Route::Queue(queue)) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| RawResponse::new(404, "{}")),
            None => RawResponse::new(
                404,
                format!(
                    r#"{{"error":"no route for {} {}"}}"#,
                    request.method, request.path
                ),
            ),
        };
        Ok(response)
    }
}
