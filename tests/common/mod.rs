#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use xp_ledger_backend::config::Config;
use xp_ledger_backend::db::config::DbConfig;
use xp_ledger_backend::db::operations::catalog::{
    self, CourseGamificationConfig, LearningUnit, Module,
};
use xp_ledger_backend::db::DatabaseProxy;
use xp_ledger_backend::state::AppState;
use xp_ledger_backend::types::{UnitKind, XpMode};

pub const TEST_SECRET: &str = "integration-test-secret";

/// A ledger on a throwaway SQLite file. The directory lives as long as this
/// value does.
pub struct TestLedger {
    pub proxy: Arc<DatabaseProxy>,
    _dir: TempDir,
}

pub async fn test_ledger() -> TestLedger {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = DbConfig::for_path(dir.path().join("ledger.db"));
    let proxy = DatabaseProxy::connect(config)
        .await
        .expect("failed to open test database");
    TestLedger { proxy, _dir: dir }
}

pub async fn add_course(proxy: &DatabaseProxy, course_id: &str, count_extra_in_primary: bool, xp_welcome: i64) {
    catalog::insert_course(proxy.pool(), course_id, "Test course")
        .await
        .expect("insert course");
    catalog::upsert_course_config(
        proxy.pool(),
        course_id,
        &CourseGamificationConfig {
            count_extra_in_primary,
            xp_welcome,
        },
    )
    .await
    .expect("insert course config");
}

pub async fn add_module(proxy: &DatabaseProxy, module_id: &str, course_id: &str, bonus_percent: i64) {
    catalog::insert_module(
        proxy.pool(),
        &Module {
            id: module_id.to_string(),
            course_id: course_id.to_string(),
            title: format!("Module {module_id}"),
            sort_index: 0,
            bonus_percent,
            is_optional: false,
        },
    )
    .await
    .expect("insert module");
}

pub fn unit(id: &str, module_id: &str, sort_index: i64, xp: i64) -> LearningUnit {
    LearningUnit {
        id: id.to_string(),
        module_id: module_id.to_string(),
        slug: format!("{id}-slug"),
        title: format!("Unit {id}"),
        kind: UnitKind::Video,
        sort_index,
        xp_mode: XpMode::Fixed,
        xp_value: Some(xp),
        xp_max: None,
        is_optional: false,
        is_extra: false,
        requires_completed_previous: false,
    }
}

pub async fn add_unit(proxy: &DatabaseProxy, unit: LearningUnit) {
    catalog::insert_unit(proxy.pool(), &unit)
        .await
        .expect("insert unit");
}

/// Course `c1` (extra counts toward primary), module `m1` with a 10% bonus:
/// `a` mandatory 100, `b` extra 50, `c` optional 30.
pub async fn seed_mixed_module(proxy: &DatabaseProxy) {
    add_course(proxy, "c1", true, 0).await;
    add_module(proxy, "m1", "c1", 10).await;
    add_unit(proxy, unit("a", "m1", 0, 100)).await;
    add_unit(
        proxy,
        LearningUnit {
            is_extra: true,
            ..unit("b", "m1", 1, 50)
        },
    )
    .await;
    add_unit(
        proxy,
        LearningUnit {
            is_optional: true,
            ..unit("c", "m1", 2, 30)
        },
    )
    .await;
}

/// Course `c3`, module `m3` with a 10% bonus and three mandatory 100 XP units.
pub async fn seed_mandatory_module(proxy: &DatabaseProxy) {
    add_course(proxy, "c3", true, 0).await;
    add_module(proxy, "m3", "c3", 10).await;
    for (index, id) in ["u1", "u2", "u3"].iter().enumerate() {
        add_unit(proxy, unit(id, "m3", index as i64, 100)).await;
    }
}

pub fn test_config() -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        log_level: "warn".to_string(),
        jwt_secret: Some(TEST_SECRET.to_string()),
        redis_url: None,
        seed_demo_course: false,
    }
}

pub fn test_app(proxy: Option<Arc<DatabaseProxy>>) -> Router {
    std::env::set_var("APP_ENV", "test");
    let state = AppState::new(proxy, None, &test_config());
    xp_ledger_backend::create_app(state)
}

pub fn bearer(user_id: &str) -> String {
    let token = xp_ledger_backend::auth::sign_jwt_for_user(user_id, TEST_SECRET, "1h")
        .expect("sign test token");
    format!("Bearer {token}")
}
