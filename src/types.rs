use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum XpType {
    Mandatory,
    Extra,
    Optional,
    Bonus,
    Welcome,
}

impl XpType {
    pub const ALL: [XpType; 5] = [
        XpType::Mandatory,
        XpType::Extra,
        XpType::Optional,
        XpType::Bonus,
        XpType::Welcome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mandatory => "MANDATORY",
            Self::Extra => "EXTRA",
            Self::Optional => "OPTIONAL",
            Self::Bonus => "BONUS",
            Self::Welcome => "WELCOME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MANDATORY" => Some(Self::Mandatory),
            "EXTRA" => Some(Self::Extra),
            "OPTIONAL" => Some(Self::Optional),
            "BONUS" => Some(Self::Bonus),
            "WELCOME" => Some(Self::Welcome),
            _ => None,
        }
    }

    /// Balance column incremented by events of this type.
    pub fn balance_column(&self) -> &'static str {
        match self {
            Self::Mandatory => "xpMandatory",
            Self::Extra => "xpExtra",
            Self::Optional => "xpOptional",
            Self::Bonus => "xpBonus",
            Self::Welcome => "xpWelcome",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UnitCompleted,
    ModuleBonus,
    CourseWelcome,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnitCompleted => "unit_completed",
            Self::ModuleBonus => "module_bonus",
            Self::CourseWelcome => "course_welcome",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unit_completed" => Some(Self::UnitCompleted),
            "module_bonus" => Some(Self::ModuleBonus),
            "course_welcome" => Some(Self::CourseWelcome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum XpMode {
    Fixed,
    QuizPartial,
}

impl XpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::QuizPartial => "QUIZ_PARTIAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "QUIZ_PARTIAL" => Self::QuizPartial,
            _ => Self::Fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    Video,
    Document,
    Link,
    Activity,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "VIDEO",
            Self::Document => "DOCUMENT",
            Self::Link => "LINK",
            Self::Activity => "ACTIVITY",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DOCUMENT" => Self::Document,
            "LINK" => Self::Link,
            "ACTIVITY" => Self::Activity,
            _ => Self::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "COMPLETED" => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

/// Target entity an event is keyed on. Unit wins over module, module over course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope<'a> {
    Unit(&'a str),
    Module(&'a str),
    Course(&'a str),
}

impl<'a> EventScope<'a> {
    pub fn resolve(course_id: &'a str, module_id: Option<&'a str>, unit_id: Option<&'a str>) -> Self {
        match (unit_id, module_id) {
            (Some(unit), _) => Self::Unit(unit),
            (None, Some(module)) => Self::Module(module),
            (None, None) => Self::Course(course_id),
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::Unit(id) => format!("unit:{id}"),
            Self::Module(id) => format!("module:{id}"),
            Self::Course(id) => format!("course:{id}"),
        }
    }
}

/// Raw accumulators of a balance row plus the fields derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTotals {
    pub xp_mandatory: i64,
    pub xp_extra: i64,
    pub xp_optional: i64,
    pub xp_bonus: i64,
    pub xp_welcome: i64,
    pub xp_primary: i64,
    pub xp_total: i64,
}

impl BalanceTotals {
    pub fn add(&mut self, xp_type: XpType, amount: i64) {
        match xp_type {
            XpType::Mandatory => self.xp_mandatory += amount,
            XpType::Extra => self.xp_extra += amount,
            XpType::Optional => self.xp_optional += amount,
            XpType::Bonus => self.xp_bonus += amount,
            XpType::Welcome => self.xp_welcome += amount,
        }
    }

    /// Recomputes `xp_primary` and `xp_total` from the raw accumulators.
    pub fn derive(mut self, count_extra_in_primary: bool) -> Self {
        let extra = if count_extra_in_primary { self.xp_extra } else { 0 };
        self.xp_primary = self.xp_mandatory + extra + self.xp_bonus + self.xp_welcome;
        self.xp_total = self.xp_primary + self.xp_optional;
        self
    }
}
