use serde::{Deserialize, Serialize};

/// Data category a retention policy applies to.
///
/// Categories this crate has no strategy for are kept verbatim in
/// [`DataCategory::Other`]; tenant configuration may name them ahead of
/// support landing here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataCategory {
    Audit,
    Leave,
    Payroll,
    Performance,
    Gdpr,
    AccessLogs,
    Notifications,
    Other(String),
}

impl DataCategory {
    pub fn as_str(&self) -> &str {
        match self {
            DataCategory::Audit => "audit",
            DataCategory::Leave => "leave",
            DataCategory::Payroll => "payroll",
            DataCategory::Performance => "performance",
            DataCategory::Gdpr => "gdpr",
            DataCategory::AccessLogs => "access_logs",
            DataCategory::Notifications => "notifications",
            DataCategory::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DataCategory::Other(_))
    }
}

impl From<&str> for DataCategory {
    fn from(value: &str) -> Self {
        match value {
            "audit" => DataCategory::Audit,
            "leave" => DataCategory::Leave,
            "payroll" => DataCategory::Payroll,
            "performance" => DataCategory::Performance,
            "gdpr" => DataCategory::Gdpr,
            "access_logs" => DataCategory::AccessLogs,
            "notifications" => DataCategory::Notifications,
            other => DataCategory::Other(other.to_string()),
        }
    }
}

impl From<String> for DataCategory {
    fn from(value: String) -> Self {
        DataCategory::from(value.as_str())
    }
}

impl From<DataCategory> for String {
    fn from(value: DataCategory) -> Self {
        match value {
            DataCategory::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl core::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_categories_are_preserved() {
        let category = DataCategory::from("recruiting");
        assert_eq!(category, DataCategory::Other("recruiting".to_string()));
        assert!(!category.is_known());
        assert_eq!(category.to_string(), "recruiting");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_value(DataCategory::AccessLogs).unwrap();
        assert_eq!(json, serde_json::json!("access_logs"));

        let parsed: DataCategory = serde_json::from_value(serde_json::json!("payroll")).unwrap();
        assert_eq!(parsed, DataCategory::Payroll);
    }
}
