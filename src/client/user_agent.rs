//! Per-operation User-Agent suffix.

/// Extra User-Agent fragments describing the operation in flight.
///
/// Rendered as `Type/<t> Name/<n> Operation/<o> ScriptLocation/<s>` with
/// empty fields skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentExtra {
    /// `Resource` or `DataSource`.
    pub kind: String,
    /// Type name, e.g. `project_ip_access_list`.
    pub name: String,
    /// `create`, `read`, `update`, `delete` or `import`.
    pub operation: String,
    /// Location of the calling script, if the host supplied one.
    pub script_location: String,
}

impl UserAgentExtra {
    /// Suffix for a resource operation.
    pub fn resource(name: &str, operation: &str) -> Self {
        Self {
            kind: "Resource".to_string(),
            name: name.to_string(),
            operation: operation.to_string(),
            script_location: String::new(),
        }
    }

    /// Suffix for a data source read.
    pub fn data_source(name: &str) -> Self {
        Self {
            kind: "DataSource".to_string(),
            name: name.to_string(),
            operation: "read".to_string(),
            script_location: String::new(),
        }
    }

    /// Merge `other` into `self`. Non-empty fields of `other` win.
    pub fn combine(&self, other: &UserAgentExtra) -> UserAgentExtra {
        fn pick(base: &str, over: &str) -> String {
            if over.is_empty() { base } else { over }.to_string()
        }
        UserAgentExtra {
            kind: pick(&self.kind, &other.kind),
            name: pick(&self.name, &other.name),
            operation: pick(&self.operation, &other.operation),
            script_location: pick(&self.script_location, &other.script_location),
        }
    }

    /// Append this suffix to an existing User-Agent value.
    pub fn to_header_value(&self, old: &str) -> String {
        let parts: Vec<String> = [
            ("Type", &self.kind),
            ("Name", &self.name),
            ("Operation", &self.operation),
            ("ScriptLocation", &self.script_location),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}/{}", key, value))
        .collect();

        let extra = parts.join(" ");
        if old.is_empty() {
            extra
        } else if extra.is_empty() {
            old.to_string()
        } else {
            format!("{} {}", old, extra)
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty()
            && self.name.is_empty()
            && self.operation.is_empty()
            && self.script_location.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_skips_empty_fields() {
        let extra = UserAgentExtra {
            kind: "Resource".into(),
            name: "project".into(),
            ..Default::default()
        };
        assert_eq!(
            extra.to_header_value("hemmer-provider-atlas/0.1.0"),
            "hemmer-provider-atlas/0.1.0 Type/Resource Name/project"
        );
        assert_eq!(extra.to_header_value(""), "Type/Resource Name/project");
        assert_eq!(UserAgentExtra::default().to_header_value("base/1"), "base/1");
    }

    #[test]
    fn test_combine_prefers_non_empty_other() {
        let base = UserAgentExtra {
            script_location: "main.hcl".into(),
            ..UserAgentExtra::resource("cluster", "read")
        };
        let merged = base.combine(&UserAgentExtra {
            operation: "update".into(),
            ..Default::default()
        });
        assert_eq!(merged.kind, "Resource");
        assert_eq!(merged.name, "cluster");
        assert_eq!(merged.operation, "update");
        assert_eq!(merged.script_location, "main.hcl");
        assert_eq!(
            merged.to_header_value(""),
            "Type/Resource Name/cluster Operation/update ScriptLocation/main.hcl"
        );
    }

    #[test]
    fn test_data_source_extra() {
        let extra = UserAgentExtra::data_source("network_container");
        assert_eq!(extra.operation, "read");
        assert!(!extra.is_empty());
        assert!(UserAgentExtra::default().is_empty());
    }
}
