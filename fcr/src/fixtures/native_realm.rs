//! Users and roles in the native realm, plus the security index upgrade.
//!
//! A cluster restarted onto a newer version may still carry a security index
//! in the old internal format. Until the migration API upgrades it, writes
//! are refused with a fixed message that operators rely on, so the verify
//! step checks that message before running the upgrade.

use fcr_common::assertions::{expect_eq, expect_present, expect_true};
use fcr_common::document::{as_object, eval};
use fcr_common::{HarnessError, HarnessResult, Method, ServerDocument};
use serde_json::{Value, json};
use tracing::info;

use super::{Fixture, FixtureContext};

pub const UPGRADE_REQUIRED_MESSAGE: &str = "Security index is not on the current version - the native realm will not be operational until the upgrade API is run on the security index";

const SECURITY_INDEX: &str = ".security";
const USER_PASSWORD: &str = "j@rV1s";
const FULL_NAME_LEN: usize = 5;

/// Concrete security index and whether it needs the upgrade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIndexState {
    pub concrete_index: String,
    pub needs_upgrade: bool,
}

impl SecurityIndexState {
    /// Classify a `GET /.security/_settings/index.format` response.
    ///
    /// An empty response means the alias resolved to nothing readable and the
    /// index is treated as `.security` needing an upgrade. Otherwise the
    /// first key names the concrete index; a missing `index` block also
    /// means an upgrade is due.
    pub fn from_settings(settings: &ServerDocument, expected_format: i64) -> HarnessResult<Self> {
        let Some(concrete) = settings.keys().first().map(|k| k.to_string()) else {
            return Ok(Self {
                concrete_index: SECURITY_INDEX.to_string(),
                needs_upgrade: true,
            });
        };

        let index_settings = as_object("settings", eval("settings", settings.get_key(&concrete)?)?)?;
        let needs_upgrade = match index_settings.get("index") {
            Some(index) => parse_format(eval("format", index)?)? != expected_format,
            None => true,
        };
        Ok(Self {
            concrete_index: concrete,
            needs_upgrade,
        })
    }
}

/// Index settings come back as strings, but tolerate plain numbers.
fn parse_format(value: &Value) -> HarnessResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| HarnessError::assertion(format!("index.format is not an integer: {value}")))
}

fn random_full_name() -> String {
    std::iter::repeat_with(fastrand::alphabetic)
        .take(FULL_NAME_LEN)
        .collect()
}

fn user_body(id: &str) -> String {
    json!({
        "password": USER_PASSWORD,
        "roles": ["admin", "other_role1"],
        "full_name": random_full_name(),
        "email": format!("{id}@example.com"),
        "enabled": true,
    })
    .to_string()
}

fn role_body() -> String {
    json!({
        "run_as": ["abc"],
        "cluster": ["monitor"],
        "indices": [{
            "names": ["events-*"],
            "privileges": ["read"],
            "field_security": {
                "grant": ["category", "@timestamp", "message"]
            },
            "query": r#"{"match": {"category": "click"}}"#,
        }],
    })
    .to_string()
}

fn create_user(cx: &FixtureContext<'_>, id: &str) -> HarnessResult<()> {
    cx.client
        .put_json(&format!("/_xpack/security/user/{id}"), &user_body(id))?;
    Ok(())
}

fn create_role(cx: &FixtureContext<'_>, id: &str) -> HarnessResult<()> {
    cx.client
        .put_json(&format!("/_xpack/security/role/{id}"), &role_body())?;
    Ok(())
}

fn assert_user_info(cx: &FixtureContext<'_>, user: &str) -> HarnessResult<()> {
    let response = cx.client.get(&format!("/_xpack/security/user/{user}"))?;
    let info = response.get_key(user)?;
    expect_eq(
        &format!("{user} email"),
        info.get("email").and_then(Value::as_str),
        Some(format!("{user}@example.com").as_str()),
    )?;
    expect_present(&format!("{user} full_name"), info.get("full_name"))?;
    expect_present(&format!("{user} roles"), info.get("roles"))?;
    Ok(())
}

fn assert_role_info(cx: &FixtureContext<'_>, role: &str) -> HarnessResult<()> {
    let response = cx.client.get(&format!("/_xpack/security/role/{role}"))?;
    let info = response.get_key(role)?;
    for field in ["run_as", "cluster", "indices"] {
        expect_present(&format!("{role} {field}"), info.get(field))?;
    }
    Ok(())
}

/// The write must be refused with the upgrade-required message.
fn expect_write_refused(cx: &FixtureContext<'_>) -> HarnessResult<()> {
    match create_user(cx, "postupgrade_user") {
        Ok(()) => Err(HarnessError::assertion(
            "should not be able to add a user when upgrade hasn't taken place",
        )),
        Err(HarnessError::Http(err)) => {
            let error_type = err.error_type();
            info!(
                status = err.status,
                error_type = error_type.as_deref().unwrap_or("unknown"),
                "write refused before security index upgrade"
            );
            expect_true(
                &format!("refused write should mention the pending upgrade, got: {err}"),
                err.mentions(UPGRADE_REQUIRED_MESSAGE),
            )
        }
        Err(other) => Err(other),
    }
}

pub struct NativeRealm;

impl Fixture for NativeRealm {
    fn name(&self) -> &'static str {
        "native_realm"
    }

    fn description(&self) -> &'static str {
        "native realm users and roles survive, upgrading the security index when required"
    }

    fn seed(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        create_user(cx, "preupgrade_user")?;
        create_role(cx, "preupgrade_role")?;
        assert_user_info(cx, "preupgrade_user")?;
        assert_role_info(cx, "preupgrade_role")
    }

    fn verify(&self, cx: &FixtureContext<'_>) -> HarnessResult<()> {
        cx.cluster().wait_for_yellow(SECURITY_INDEX)?;
        let settings = cx
            .client
            .get(&format!("/{SECURITY_INDEX}/_settings/index.format"))?;
        info!(settings = %settings.root(), "security index settings");
        let state = SecurityIndexState::from_settings(&settings, cx.settings.security_index_format)?;

        if state.needs_upgrade {
            info!(index = %state.concrete_index, "upgrading security index");
            expect_write_refused(cx)?;
            let upgrade = cx.client.request_text(
                Method::Post,
                &format!("/_xpack/migration/upgrade/{}", state.concrete_index),
                &[],
                None,
            )?;
            info!(response = %upgrade, "security index upgrade finished");
        }

        create_user(cx, "postupgrade_user")?;
        create_role(cx, "postupgrade_role")?;

        assert_user_info(cx, "preupgrade_user")?;
        assert_role_info(cx, "preupgrade_role")?;
        assert_user_info(cx, "postupgrade_user")?;
        assert_role_info(cx, "postupgrade_role")
    }
}
