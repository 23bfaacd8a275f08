//! SQL dialect detection.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Detect from dump content
    #[default]
    Auto,
    Generic,
    PostgreSQL,
    MySQL,
}

const POSTGRES_MARKERS: &[&str] = &[
    "postgresql database dump",
    "pg_dump",
    "serial",
    "::",
    "timestamptz",
    "jsonb",
    "alter table only",
];

const MYSQL_MARKERS: &[&str] = &[
    "mysql dump",
    "mysqldump",
    "auto_increment",
    "engine=",
    "tinyint",
    "unsigned",
    "`",
];

impl Dialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "generic" => Some(Self::Generic),
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            _ => None,
        }
    }

    /// Pick the dialect with more markers present; ties are generic.
    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();
        let score = |markers: &[&str]| markers.iter().filter(|m| lower.contains(*m)).count();
        let (pg, my) = (score(POSTGRES_MARKERS), score(MYSQL_MARKERS));

        match pg.cmp(&my) {
            std::cmp::Ordering::Greater => Self::PostgreSQL,
            std::cmp::Ordering::Less => Self::MySQL,
            std::cmp::Ordering::Equal => Self::Generic,
        }
    }

    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }
}
