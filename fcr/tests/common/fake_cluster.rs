//! In-memory cluster used to drive both phases end to end.
//!
//! The model keeps just enough behavior for every fixture: stored documents,
//! users and roles, watches normalized the way the server stores them,
//! templates, the migration assistant, and a watcher whose nodes converge to
//! a requested state over a few stats calls. `restart` switches the version
//! and decides whether the upgraded cluster still needs migration calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fcr::fixtures::UPGRADE_REQUIRED_MESSAGE;
use fcr_common::config::{DEFAULT_MONITORING_TEMPLATE_IDS, DEFAULT_READINESS_TEMPLATES};
use fcr_common::{HttpRequest, Method, RawResponse, Transport, TransportError};
use serde_json::{Map, Value, json};

pub const OLD_MONITORING_TEMPLATE_VERSION: i64 = 5_050_099;
pub const NEW_MONITORING_TEMPLATE_VERSION: i64 = 6_000_026;
pub const OLD_WATCHER_TEMPLATES: [&str; 3] = ["watches", "triggered_watches", "watch-history-6"];

/// Stats calls a node needs to reach the requested watcher state.
const WATCHER_LAG: u32 = 2;
/// Template fetches before the new cluster refreshes monitoring templates.
const TEMPLATE_REFRESH_LAG: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherTarget {
    Started,
    Stopped,
}

struct State {
    version: String,
    restarted: bool,
    security_format: Option<i64>,
    accept_writes_before_upgrade: bool,
    refusal_reason: Option<String>,
    acknowledge_stop: bool,
    docs: BTreeMap<String, String>,
    users: BTreeMap<String, Value>,
    roles: BTreeMap<String, Value>,
    watches: BTreeMap<String, (Value, i64)>,
    watches_need_upgrade: bool,
    triggered_need_upgrade: bool,
    watcher_target: WatcherTarget,
    watcher_lag: u32,
    templates: BTreeMap<String, Value>,
    template_refresh_lag: u32,
    stale_cluster_stats: u32,
    search_ticks: i64,
    requests: Vec<(Method, String, u16)>,
}

#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new(version: &str) -> Self {
        let mut templates = BTreeMap::new();
        for name in DEFAULT_READINESS_TEMPLATES {
            templates.insert(name.to_string(), json!({"order": 0}));
        }
        for id in DEFAULT_MONITORING_TEMPLATE_IDS {
            templates.insert(
                format!(".monitoring-{id}"),
                json!({"version": OLD_MONITORING_TEMPLATE_VERSION}),
            );
        }
        for name in OLD_WATCHER_TEMPLATES {
            templates.insert(name.to_string(), json!({"order": 2147483647}));
        }

        Self {
            state: Arc::new(Mutex::new(State {
                version: version.to_string(),
                restarted: false,
                security_format: None,
                accept_writes_before_upgrade: false,
                refusal_reason: None,
                acknowledge_stop: true,
                docs: BTreeMap::new(),
                users: BTreeMap::new(),
                roles: BTreeMap::new(),
                watches: BTreeMap::new(),
                watches_need_upgrade: false,
                triggered_need_upgrade: false,
                watcher_target: WatcherTarget::Started,
                watcher_lag: 0,
                templates,
                template_refresh_lag: 0,
                stale_cluster_stats: 0,
                search_ticks: 0,
                requests: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Full restart onto `version`. With `upgrade_required` the security and
    /// watcher indices stay in the old format until the migration API runs.
    pub fn restart(&self, version: &str, upgrade_required: bool) {
        let mut st = self.lock();
        st.version = version.to_string();
        st.restarted = true;
        st.watcher_target = WatcherTarget::Stopped;
        st.watcher_lag = 0;
        st.template_refresh_lag = TEMPLATE_REFRESH_LAG;
        st.stale_cluster_stats = 1;
        if upgrade_required {
            st.watches_need_upgrade = true;
            st.triggered_need_upgrade = true;
        } else {
            st.security_format = Some(6);
            for name in OLD_WATCHER_TEMPLATES {
                st.templates.remove(name);
            }
        }
    }

    /// Accept native realm writes even though the security index is old.
    pub fn accept_writes_before_upgrade(&self) {
        self.lock().accept_writes_before_upgrade = true;
    }

    /// Refuse native realm writes before the upgrade with `reason` instead
    /// of the upgrade-required message.
    pub fn refuse_writes_with(&self, reason: &str) {
        self.lock().refusal_reason = Some(reason.to_string());
    }

    /// Answer `_stop` without acknowledging it.
    pub fn refuse_stop(&self) {
        self.lock().acknowledge_stop = false;
    }

    /// Overwrite a field of a stored watch, simulating a lossy upgrade.
    pub fn corrupt_watch(&self, id: &str, field: &str, value: Value) {
        let mut st = self.lock();
        if let Some((watch, _)) = st.watches.get_mut(id) {
            watch[field] = value;
        }
    }

    pub fn watch(&self, id: &str) -> Option<(Value, i64)> {
        self.lock().watches.get(id).cloned()
    }

    pub fn user(&self, id: &str) -> Option<Value> {
        self.lock().users.get(id).cloned()
    }

    pub fn security_format(&self) -> Option<i64> {
        self.lock().security_format
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.lock().templates.contains_key(name)
    }

    /// Watcher state every node has settled on, if they agree.
    pub fn settled_watcher_state(&self) -> Option<&'static str> {
        let st = self.lock();
        (st.watcher_lag == 0).then(|| target_name(st.watcher_target))
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|(m, p, _)| *m == method && p == path)
            .count()
    }

    pub fn count_status(&self, method: Method, path: &str, status: u16) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|(m, p, s)| *m == method && p == path && *s == status)
            .count()
    }
}

impl Transport for FakeCluster {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut st = self.lock();
        let response = route(&mut st, request);
        st.requests
            .push((request.method, request.path.clone(), response.status));
        Ok(response)
    }
}

fn ok(body: Value) -> RawResponse {
    RawResponse::new(200, body.to_string())
}

/// `{ "<key>": value }`, the shape of security entity lookups.
fn keyed(key: &str, value: &Value) -> RawResponse {
    let mut map = Map::new();
    map.insert(key.to_string(), value.clone());
    ok(Value::Object(map))
}

fn not_found() -> RawResponse {
    RawResponse::new(404, "{}")
}

fn target_name(target: WatcherTarget) -> &'static str {
    match target {
        WatcherTarget::Started => "started",
        WatcherTarget::Stopped => "stopped",
    }
}

fn body_json(request: &HttpRequest) -> Option<Value> {
    request
        .body
        .as_deref()
        .and_then(|body| serde_json::from_str(body).ok())
}

fn route(st: &mut State, request: &HttpRequest) -> RawResponse {
    let segments: Vec<&str> = request
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (request.method, segments.as_slice()) {
        (Method::Get, []) => ok(json!({
            "name": "node-0",
            "version": {"number": st.version},
            "tagline": "You Know, for Search",
        })),
        (Method::Get, ["_cluster", "health", _]) => {
            ok(json!({"status": "yellow", "timed_out": false}))
        }
        (Method::Put, ["testsingledoc", "doc", id]) => {
            let body = request.body.clone().unwrap_or_default();
            st.docs.insert(id.to_string(), body);
            ok(json!({"_index": "testsingledoc", "_id": id, "result": "created"}))
        }
        (Method::Get, ["testsingledoc", "doc", id]) => match st.docs.get(*id) {
            Some(source) => RawResponse::new(
                200,
                format!(
                    r#"{{"_index":"testsingledoc","_type":"doc","_id":"{id}","_version":1,"found":true,"_source":{source}}}"#
                ),
            ),
            None => RawResponse::new(404, r#"{"found":false}"#),
        },
        (Method::Put, ["_xpack", "security", kind @ ("user" | "role"), id]) => {
            put_security_entity(st, kind, id, request)
        }
        (Method::Get, ["_xpack", "security", "user", id]) => match st.users.get(*id) {
            Some(user) => keyed(id, user),
            None => not_found(),
        },
        (Method::Get, ["_xpack", "security", "role", id]) => match st.roles.get(*id) {
            Some(role) => keyed(id, role),
            None => not_found(),
        },
        (Method::Get, [".security", "_settings", "index.format"]) => match st.security_format {
            Some(format) => ok(json!({
                ".security-6": {"settings": {"index": {"format": format.to_string()}}}
            })),
            None => ok(json!({".security": {"settings": {}}})),
        },
        (Method::Get, ["_xpack", "migration", "assistance"]) => {
            let mut indices = Map::new();
            if st.restarted && st.security_format != Some(6) {
                indices.insert(".security".into(), json!({"action_required": "upgrade"}));
            }
            if st.watches_need_upgrade {
                indices.insert(".watches".into(), json!({"action_required": "upgrade"}));
            }
            if st.triggered_need_upgrade {
                indices.insert(".triggered_watches".into(), json!({"action_required": "upgrade"}));
            }
            ok(json!({"indices": indices}))
        }
        (Method::Post, ["_xpack", "migration", "upgrade", index]) => migrate(st, index),
        (Method::Put, ["_xpack", "watcher", "watch", id]) => put_watch(st, id, request),
        (Method::Get, ["_xpack", "watcher", "watch", id]) => match st.watches.get(*id) {
            Some((watch, version)) => ok(json!({
                "found": true,
                "_id": id,
                "_version": version,
                "watch": watch,
            })),
            None => RawResponse::new(404, format!(r#"{{"found":false,"_id":"{id}"}}"#)),
        },
        (Method::Post, ["_xpack", "watcher", "_start"]) => {
            st.watcher_target = WatcherTarget::Started;
            st.watcher_lag = WATCHER_LAG;
            ok(json!({"acknowledged": true}))
        }
        (Method::Post, ["_xpack", "watcher", "_stop"]) => {
            st.watcher_target = WatcherTarget::Stopped;
            st.watcher_lag = WATCHER_LAG;
            ok(json!({"acknowledged": st.acknowledge_stop}))
        }
        (Method::Get, ["_xpack", "watcher", "stats"]) => watcher_stats(st),
        (Method::Get, ["_template"]) => ok(Value::Object(st.templates.clone().into_iter().collect())),
        (Method::Get, ["_template", pattern]) => get_templates(st, pattern),
        (Method::Get, [index, "_search"]) => search(st, index),
        _ => RawResponse::new(
            400,
            format!(
                r#"{{"error":{{"type":"illegal_argument_exception","reason":"no handler for {} {}"}},"status":400}}"#,
                request.method, request.path
            ),
        ),
    }
}

fn put_security_entity(st: &mut State, kind: &str, id: &str, request: &HttpRequest) -> RawResponse {
    let blocked = st.restarted && st.security_format != Some(6) && !st.accept_writes_before_upgrade;
    if blocked {
        let reason = st
            .refusal_reason
            .clone()
            .unwrap_or_else(|| UPGRADE_REQUIRED_MESSAGE.to_string());
        let error = json!({
            "error": {
                "root_cause": [{"type": "illegal_state_exception", "reason": reason}],
                "type": "illegal_state_exception",
                "reason": reason,
            },
            "status": 400,
        });
        return RawResponse::new(400, error.to_string());
    }

    let Some(mut body) = body_json(request) else {
        return RawResponse::new(400, r#"{"error":{"type":"parse_exception","reason":"missing body"}}"#);
    };
    if kind == "user" {
        if let Some(user) = body.as_object_mut() {
            user.remove("password");
            user.insert("username".into(), json!(id));
            user.insert("metadata".into(), json!({}));
        }
        let created = st.users.insert(id.to_string(), body).is_none();
        ok(json!({"user": {"created": created}}))
    } else {
        let created = st.roles.insert(id.to_string(), body).is_none();
        ok(json!({"role": {"created": created}}))
    }
}

fn migrate(st: &mut State, index: &str) -> RawResponse {
    match index {
        ".security" => {
            st.security_format = Some(6);
            let total = (st.users.len() + st.roles.len()) as i64;
            ok(json!({"took": 12, "timed_out": false, "total": total}))
        }
        ".watches" => {
            st.watches_need_upgrade = false;
            for name in OLD_WATCHER_TEMPLATES {
                st.templates.remove(name);
            }
            ok(json!({"took": 30, "timed_out": false, "total": st.watches.len()}))
        }
        ".triggered_watches" => {
            st.triggered_need_upgrade = false;
            ok(json!({"took": 3, "timed_out": false, "total": 0}))
        }
        _ => not_found(),
    }
}

fn put_watch(st: &mut State, id: &str, request: &HttpRequest) -> RawResponse {
    let Some(body) = body_json(request) else {
        return RawResponse::new(400, r#"{"error":{"type":"parse_exception","reason":"missing body"}}"#);
    };
    let normalized = normalize_watch(&body, None);
    let version = st.watches.get(id).map_or(1, |(_, v)| v + 1);
    st.watches.insert(id.to_string(), (normalized, version));
    ok(json!({"_id": id, "_version": version, "created": version == 1}))
}

fn watcher_stats(st: &mut State) -> RawResponse {
    let settled = target_name(st.watcher_target);
    let lagging = match st.watcher_target {
        WatcherTarget::Started => "starting",
        WatcherTarget::Stopped => "stopping",
    };
    let second = if st.watcher_lag > 0 { lagging } else { settled };
    st.watcher_lag = st.watcher_lag.saturating_sub(1);
    ok(json!({
        "watcher_state": settled,
        "stats": [
            {"node_id": "node-0", "watcher_state": settled, "watch_count": st.watches.len()},
            {"node_id": "node-1", "watcher_state": second, "watch_count": st.watches.len()},
        ],
    }))
}

fn get_templates(st: &mut State, pattern: &str) -> RawResponse {
    if pattern == ".monitoring-*" && st.restarted {
        if st.template_refresh_lag == 0 {
            for (name, template) in st.templates.iter_mut() {
                if name.starts_with(".monitoring-") {
                    template["version"] = json!(NEW_MONITORING_TEMPLATE_VERSION);
                }
            }
        } else {
            st.template_refresh_lag -= 1;
        }
    }

    let matched: Map<String, Value> = st
        .templates
        .iter()
        .filter(|(name, _)| match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name.as_str() == pattern,
        })
        .map(|(name, template)| (name.clone(), template.clone()))
        .collect();
    if matched.is_empty() {
        not_found()
    } else {
        ok(Value::Object(matched))
    }
}

fn search(st: &mut State, index: &str) -> RawResponse {
    st.search_ticks += 1;
    match index {
        "bwc_watch_index" => {
            let total = if st.watches.contains_key("bwc_watch") {
                st.search_ticks
            } else {
                0
            };
            ok(json!({"hits": {"total": total, "hits": []}}))
        }
        ".watcher-history*" => {
            let total = st.search_ticks * st.watches.len() as i64;
            ok(json!({"hits": {"total": total, "hits": []}}))
        }
        ".monitoring-es-*" => {
            let version = if st.stale_cluster_stats > 0 {
                st.stale_cluster_stats -= 1;
                "5.6.0".to_string()
            } else {
                st.version.clone()
            };
            ok(json!({"hits": {"total": 1, "hits": [
                {"_index": ".monitoring-es-6-2017.10.01", "_source": {"type": "cluster_stats", "version": version}}
            ]}}))
        }
        _ => not_found(),
    }
}

/// Store a watch the way the server returns it: time values in
/// milliseconds, credentials hidden, logging level defaulted.
fn normalize_watch(value: &Value, parent: Option<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, field) in map {
                match key.as_str() {
                    "throttle_period" => {
                        out.insert("throttle_period_in_millis".into(), json!(millis(field)));
                    }
                    "timeout" if field.is_string() => {
                        out.insert("timeout_in_millis".into(), json!(millis(field)));
                    }
                    "read_timeout" => {
                        out.insert("read_timeout_millis".into(), json!(millis(field)));
                    }
                    "password" if parent == Some("basic") => {}
                    _ => {
                        out.insert(key.clone(), normalize_watch(field, Some(key)));
                    }
                }
            }
            if parent == Some("logging") && !out.contains_key("level") {
                out.insert("level".into(), json!("info"));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize_watch(v, parent)).collect()),
        other => other.clone(),
    }
}

fn millis(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => {
            let split = s.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(s.len());
            let (amount, unit) = s.split_at(split);
            let amount: f64 = amount.trim().parse().unwrap_or_default();
            let factor = match unit {
                "ms" => 1.0,
                "s" => 1_000.0,
                "m" => 60_000.0,
                "h" => 3_600_000.0,
                _ => 1.0,
            };
            (amount * factor).round() as i64
        }
        _ => 0,
    }
}
