use crate::db::operations::catalog::{self, CourseGamificationConfig, LearningUnit, Module};
use crate::db::DatabaseProxy;
use crate::types::{UnitKind, XpMode};

pub const DEMO_COURSE_ID: &str = "demo-course";

struct DemoUnit {
    slug: &'static str,
    title: &'static str,
    kind: UnitKind,
    xp: i64,
    is_optional: bool,
    is_extra: bool,
}

const DEMO_UNITS: &[DemoUnit] = &[
    DemoUnit {
        slug: "welcome-video",
        title: "Welcome",
        kind: UnitKind::Video,
        xp: 100,
        is_optional: false,
        is_extra: false,
    },
    DemoUnit {
        slug: "reading-list",
        title: "Reading list",
        kind: UnitKind::Document,
        xp: 100,
        is_optional: false,
        is_extra: false,
    },
    DemoUnit {
        slug: "first-reflection",
        title: "First reflection",
        kind: UnitKind::Activity,
        xp: 100,
        is_optional: false,
        is_extra: false,
    },
    DemoUnit {
        slug: "deep-dive",
        title: "Deep dive",
        kind: UnitKind::Video,
        xp: 50,
        is_optional: false,
        is_extra: true,
    },
    DemoUnit {
        slug: "further-reading",
        title: "Further reading",
        kind: UnitKind::Link,
        xp: 30,
        is_optional: true,
        is_extra: false,
    },
];

/// Inserts a one-module demo course unless it already exists.
pub async fn seed_demo_course(proxy: &DatabaseProxy) -> Result<bool, sqlx::Error> {
    let pool = proxy.pool();
    if catalog::get_course(pool, DEMO_COURSE_ID).await?.is_some() {
        tracing::debug!("demo course already exists");
        return Ok(false);
    }

    let module = Module {
        id: format!("{DEMO_COURSE_ID}-m1"),
        course_id: DEMO_COURSE_ID.to_string(),
        title: "Getting started".to_string(),
        sort_index: 0,
        bonus_percent: 10,
        is_optional: false,
    };

    let mut tx = pool.begin().await?;
    catalog::insert_course(&mut *tx, DEMO_COURSE_ID, "Demo course").await?;
    catalog::upsert_course_config(
        &mut *tx,
        DEMO_COURSE_ID,
        &CourseGamificationConfig {
            count_extra_in_primary: true,
            xp_welcome: 20,
        },
    )
    .await?;
    catalog::insert_module(&mut *tx, &module).await?;

    for (index, demo) in DEMO_UNITS.iter().enumerate() {
        let unit = LearningUnit {
            id: format!("{}-u{}", module.id, index + 1),
            module_id: module.id.clone(),
            slug: demo.slug.to_string(),
            title: demo.title.to_string(),
            kind: demo.kind,
            sort_index: index as i64,
            xp_mode: XpMode::Fixed,
            xp_value: Some(demo.xp),
            xp_max: None,
            is_optional: demo.is_optional,
            is_extra: demo.is_extra,
            requires_completed_previous: index > 0 && !demo.is_optional,
        };
        catalog::insert_unit(&mut *tx, &unit).await?;
    }
    tx.commit().await?;

    tracing::info!(course_id = DEMO_COURSE_ID, units = DEMO_UNITS.len(), "seeded demo course");
    Ok(true)
}
