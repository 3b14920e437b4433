use serde::{Deserialize, Serialize};

/// Provenance of an entity's current value.
///
/// Never part of the content hash: two runs over identical source data with
/// different run identifiers must not produce updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSource {
    /// Source format, e.g. "traveline-noc" or "naptan"
    #[serde(default)]
    pub original_format: String,

    /// Who published the data
    #[serde(default)]
    pub provider: String,

    /// File or feed the records came from
    #[serde(default)]
    pub dataset: String,

    /// Per-run identifier (generation date, or a fresh UUID)
    #[serde(default)]
    pub identifier: String,
}

impl DataSource {
    pub fn new(original_format: &str, provider: &str, dataset: &str) -> Self {
        DataSource {
            original_format: original_format.to_string(),
            provider: provider.to_string(),
            dataset: dataset.to_string(),
            identifier: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Builder pattern: use a source-provided run identifier
    pub fn with_identifier(mut self, identifier: &str) -> Self {
        if !identifier.is_empty() {
            self.identifier = identifier.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_assigns_run_identifier() {
        let a = DataSource::new("naptan", "Department for Transport", "Stops.csv");
        let b = DataSource::new("naptan", "Department for Transport", "Stops.csv");

        assert!(!a.identifier.is_empty());
        assert_ne!(a.identifier, b.identifier);
    }

    #[test]
    fn test_with_identifier_ignores_empty() {
        let ds = DataSource::new("traveline-noc", "Traveline", "noc").with_identifier("");
        assert!(!ds.identifier.is_empty());

        let ds = ds.with_identifier("2024-01-01");
        assert_eq!(ds.identifier, "2024-01-01");
    }
}
