//! Read access to the content catalog (courses, modules, units, per-course
//! gamification policy). The catalog is authored elsewhere; the insert
//! helpers at the bottom exist for seeding and tests.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::types::{UnitKind, XpMode, XpType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub sort_index: i64,
    pub bonus_percent: i64,
    pub is_optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningUnit {
    pub id: String,
    pub module_id: String,
    pub slug: String,
    pub title: String,
    pub kind: UnitKind,
    pub sort_index: i64,
    pub xp_mode: XpMode,
    pub xp_value: Option<i64>,
    pub xp_max: Option<i64>,
    pub is_optional: bool,
    pub is_extra: bool,
    pub requires_completed_previous: bool,
}

impl LearningUnit {
    /// Optional wins over extra when both flags are set.
    pub fn xp_type(&self) -> XpType {
        if self.is_optional {
            XpType::Optional
        } else if self.is_extra {
            XpType::Extra
        } else {
            XpType::Mandatory
        }
    }

    pub fn is_required(&self) -> bool {
        !self.is_optional && !self.is_extra
    }

    /// XP granted by a synchronous completion. Quiz partial credit is not
    /// computed on this path and yields zero.
    pub fn completion_xp(&self) -> i64 {
        match self.xp_mode {
            XpMode::Fixed => self.xp_value.unwrap_or(0).max(0),
            XpMode::QuizPartial => 0,
        }
    }
}

/// A unit together with the module and course it belongs to.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub unit: LearningUnit,
    pub module: Module,
    pub course_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGamificationConfig {
    pub count_extra_in_primary: bool,
    pub xp_welcome: i64,
}

impl Default for CourseGamificationConfig {
    fn default() -> Self {
        Self {
            count_extra_in_primary: true,
            xp_welcome: 0,
        }
    }
}

const UNIT_COLUMNS: &str = r#""id", "moduleId", "slug", "title", "kind", "sortIndex", "xpMode",
    "xpValue", "xpMax", "isOptional", "isExtra", "requiresCompletedPrevious""#;

const MODULE_COLUMNS: &str =
    r#""id", "courseId", "title", "sortIndex", "bonusPercent", "isOptional""#;

fn map_unit(row: &SqliteRow) -> Result<LearningUnit, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let xp_mode: String = row.try_get("xpMode")?;
    Ok(LearningUnit {
        id: row.try_get("id")?,
        module_id: row.try_get("moduleId")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        kind: UnitKind::parse(&kind),
        sort_index: row.try_get("sortIndex")?,
        xp_mode: XpMode::parse(&xp_mode),
        xp_value: row.try_get("xpValue")?,
        xp_max: row.try_get("xpMax")?,
        is_optional: row.try_get("isOptional")?,
        is_extra: row.try_get("isExtra")?,
        requires_completed_previous: row.try_get("requiresCompletedPrevious")?,
    })
}

fn map_module(row: &SqliteRow) -> Result<Module, sqlx::Error> {
    Ok(Module {
        id: row.try_get("id")?,
        course_id: row.try_get("courseId")?,
        title: row.try_get("title")?,
        sort_index: row.try_get("sortIndex")?,
        bonus_percent: row.try_get("bonusPercent")?,
        is_optional: row.try_get("isOptional")?,
    })
}

pub async fn get_course<'e, E>(executor: E, course_id: &str) -> Result<Option<Course>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(r#"SELECT "id", "title" FROM "courses" WHERE "id" = ?"#)
        .bind(course_id)
        .fetch_optional(executor)
        .await?;

    row.map(|r| {
        Ok(Course {
            id: r.try_get("id")?,
            title: r.try_get("title")?,
        })
    })
    .transpose()
}

pub async fn get_module<'e, E>(executor: E, module_id: &str) -> Result<Option<Module>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(r#"SELECT {MODULE_COLUMNS} FROM "modules" WHERE "id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(module_id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(map_module).transpose()
}

pub async fn get_unit<'e, E>(executor: E, unit_id: &str) -> Result<Option<LearningUnit>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(r#"SELECT {UNIT_COLUMNS} FROM "learning_units" WHERE "id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(unit_id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(map_unit).transpose()
}

/// Units of a module ordered by `sortIndex`.
pub async fn list_module_units<'e, E>(
    executor: E,
    module_id: &str,
) -> Result<Vec<LearningUnit>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"SELECT {UNIT_COLUMNS} FROM "learning_units" WHERE "moduleId" = ? ORDER BY "sortIndex" ASC, "id" ASC"#
    );
    let rows = sqlx::query(&sql)
        .bind(module_id)
        .fetch_all(executor)
        .await?;
    rows.iter().map(map_unit).collect()
}

pub async fn get_unit_context<'e, E>(
    executor: E,
    unit_id: &str,
) -> Result<Option<UnitContext>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = r#"
        SELECT u."id", u."moduleId", u."slug", u."title", u."kind", u."sortIndex", u."xpMode",
               u."xpValue", u."xpMax", u."isOptional", u."isExtra", u."requiresCompletedPrevious",
               m."courseId" AS "m_courseId", m."title" AS "m_title", m."sortIndex" AS "m_sortIndex",
               m."bonusPercent" AS "m_bonusPercent", m."isOptional" AS "m_isOptional"
        FROM "learning_units" u
        JOIN "modules" m ON m."id" = u."moduleId"
        JOIN "courses" c ON c."id" = m."courseId"
        WHERE u."id" = ?
    "#;
    let row = sqlx::query(sql)
        .bind(unit_id)
        .fetch_optional(executor)
        .await?;

    let Some(row) = row else { return Ok(None) };
    let unit = map_unit(&row)?;
    let course_id: String = row.try_get("m_courseId")?;
    let module = Module {
        id: unit.module_id.clone(),
        course_id: course_id.clone(),
        title: row.try_get("m_title")?,
        sort_index: row.try_get("m_sortIndex")?,
        bonus_percent: row.try_get("m_bonusPercent")?,
        is_optional: row.try_get("m_isOptional")?,
    };

    Ok(Some(UnitContext {
        unit,
        module,
        course_id,
    }))
}

/// Policy for a course; a missing row means defaults.
pub async fn get_course_config<'e, E>(
    executor: E,
    course_id: &str,
) -> Result<CourseGamificationConfig, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT "countExtraInPrimary", "xpWelcome" FROM "course_gamification_config" WHERE "courseId" = ?"#,
    )
    .bind(course_id)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(r) => Ok(CourseGamificationConfig {
            count_extra_in_primary: r.try_get("countExtraInPrimary")?,
            xp_welcome: r.try_get("xpWelcome")?,
        }),
        None => Ok(CourseGamificationConfig::default()),
    }
}

/// Slug of the unit after `sort_index` in the same module, if any.
pub async fn next_unit_slug<'e, E>(
    executor: E,
    module_id: &str,
    sort_index: i64,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"SELECT "slug" FROM "learning_units"
           WHERE "moduleId" = ? AND "sortIndex" > ?
           ORDER BY "sortIndex" ASC, "id" ASC LIMIT 1"#,
    )
    .bind(module_id)
    .bind(sort_index)
    .fetch_optional(executor)
    .await
}

/// Id of the unit before `sort_index` in the same module, if any.
pub async fn previous_unit_id<'e, E>(
    executor: E,
    module_id: &str,
    sort_index: i64,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"SELECT "id" FROM "learning_units"
           WHERE "moduleId" = ? AND "sortIndex" < ?
           ORDER BY "sortIndex" DESC, "id" DESC LIMIT 1"#,
    )
    .bind(module_id)
    .bind(sort_index)
    .fetch_optional(executor)
    .await
}

pub async fn insert_course<'e, E>(executor: E, course_id: &str, title: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(r#"INSERT INTO "courses" ("id", "title", "createdAt") VALUES (?, ?, ?)"#)
        .bind(course_id)
        .bind(title)
        .bind(Utc::now())
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn upsert_course_config<'e, E>(
    executor: E,
    course_id: &str,
    config: &CourseGamificationConfig,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "course_gamification_config" ("courseId", "countExtraInPrimary", "xpWelcome")
        VALUES (?, ?, ?)
        ON CONFLICT ("courseId") DO UPDATE SET
            "countExtraInPrimary" = excluded."countExtraInPrimary",
            "xpWelcome" = excluded."xpWelcome"
        "#,
    )
    .bind(course_id)
    .bind(config.count_extra_in_primary)
    .bind(config.xp_welcome)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_module<'e, E>(executor: E, module: &Module) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "modules" ("id", "courseId", "title", "sortIndex", "bonusPercent", "isOptional")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&module.id)
    .bind(&module.course_id)
    .bind(&module.title)
    .bind(module.sort_index)
    .bind(module.bonus_percent)
    .bind(module.is_optional)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_unit<'e, E>(executor: E, unit: &LearningUnit) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "learning_units" (
            "id", "moduleId", "slug", "title", "kind", "sortIndex", "xpMode",
            "xpValue", "xpMax", "isOptional", "isExtra", "requiresCompletedPrevious"
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&unit.id)
    .bind(&unit.module_id)
    .bind(&unit.slug)
    .bind(&unit.title)
    .bind(unit.kind.as_str())
    .bind(unit.sort_index)
    .bind(unit.xp_mode.as_str())
    .bind(unit.xp_value)
    .bind(unit.xp_max)
    .bind(unit.is_optional)
    .bind(unit.is_extra)
    .bind(unit.requires_completed_previous)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(is_optional: bool, is_extra: bool, xp_mode: XpMode, xp_value: Option<i64>) -> LearningUnit {
        LearningUnit {
            id: "u1".to_string(),
            module_id: "m1".to_string(),
            slug: "u1".to_string(),
            title: "Unit".to_string(),
            kind: UnitKind::Video,
            sort_index: 0,
            xp_mode,
            xp_value,
            xp_max: None,
            is_optional,
            is_extra,
            requires_completed_previous: false,
        }
    }

    #[test]
    fn test_xp_type_classification() {
        assert_eq!(unit(false, false, XpMode::Fixed, None).xp_type(), XpType::Mandatory);
        assert_eq!(unit(false, true, XpMode::Fixed, None).xp_type(), XpType::Extra);
        assert_eq!(unit(true, false, XpMode::Fixed, None).xp_type(), XpType::Optional);
        assert_eq!(unit(true, true, XpMode::Fixed, None).xp_type(), XpType::Optional);
    }

    #[test]
    fn test_completion_xp() {
        assert_eq!(unit(false, false, XpMode::Fixed, Some(100)).completion_xp(), 100);
        assert_eq!(unit(false, false, XpMode::Fixed, None).completion_xp(), 0);
        assert_eq!(unit(false, false, XpMode::QuizPartial, Some(100)).completion_xp(), 0);
    }
}
