// 🏢 Traveline NOC - six linked tables resolved into Operators and OperatorGroups
//
// Table order is part of the contract; later tables refine earlier ones:
//   1. Groups               → OperatorGroup per GroupID
//   2. ManagementDivisions  → ManagementDivisionID → GroupID
//   3. NOCLines             → identity, PrimaryName = PubNm, licence, mode
//   4. NOCTable             → extra names; registers OperatorID / PublicNameID
//   5. Operators            → extra name; OperatorGroupRef via division
//   6. PublicName           → PrimaryName overwritten, website, social, contacts

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::read_table;
use crate::contact::{ContactClassifier, ContactField};
use crate::entities::{
    DataSource, Operator, OperatorGroup, OPERATOR_GROUP_ID_PREFIX, OPERATOR_ID_PREFIX,
};
use crate::error::SourceError;
use crate::filter;
use crate::resolver::{EntityArena, MultiIndex, UniqueIndex};

pub const ORIGINAL_FORMAT: &str = "traveline-noc";
pub const PROVIDER: &str = "Traveline";

static WEBSITE_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(.+)#").expect("WEBSITE_MARKUP is a valid regex pattern"));

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NocLineRecord {
    #[serde(rename = "NOCCODE")]
    pub noc_code: String,
    #[serde(rename = "PubNm", default)]
    pub public_name: String,
    #[serde(rename = "RefNm", default)]
    pub reference_name: String,
    #[serde(rename = "Licence", default)]
    pub licence: String,
    #[serde(rename = "Mode", default)]
    pub mode: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NocTableRecord {
    #[serde(rename = "NOCCODE")]
    pub noc_code: String,
    #[serde(rename = "OperatorPublicName", default)]
    pub operator_public_name: String,
    #[serde(rename = "VOSA_PSVLicenseName", default)]
    pub vosa_psv_license_name: String,
    #[serde(rename = "OpId", default)]
    pub operator_id: String,
    #[serde(rename = "PubNmId", default)]
    pub public_name_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorRecord {
    #[serde(rename = "OpId")]
    pub operator_id: String,
    #[serde(rename = "OpNm", default)]
    pub operator_name: String,
    #[serde(rename = "ManDivId", default)]
    pub management_division_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupRecord {
    #[serde(rename = "GrpID")]
    pub group_id: String,
    #[serde(rename = "GroupName", default)]
    pub group_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagementDivisionRecord {
    #[serde(rename = "ManDivID")]
    pub management_division_id: String,
    #[serde(rename = "GrpID", default)]
    pub group_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicNameRecord {
    #[serde(rename = "PubNmId")]
    pub public_name_id: String,
    #[serde(rename = "OperatorPublicName", default)]
    pub operator_public_name: String,
    #[serde(rename = "Website", default)]
    pub website: String,
    #[serde(rename = "Twitter", default)]
    pub twitter: String,
    #[serde(rename = "Facebook", default)]
    pub facebook: String,
    #[serde(rename = "YouTube", default)]
    pub youtube: String,
    #[serde(rename = "LostPropEnq", default)]
    pub lost_property_enquiry: String,
    #[serde(rename = "DisruptEnq", default)]
    pub disruption_enquiry: String,
    #[serde(rename = "ComplEnq", default)]
    pub complaint_enquiry: String,
    #[serde(rename = "FareEnq", default)]
    pub fare_enquiry: String,
    #[serde(rename = "TTRteEnq", default)]
    pub timetable_route_enquiry: String,
}

// ============================================================================
// TABLE SET
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NocTables {
    /// Upstream publication date; becomes the DataSource identifier
    pub generation_date: String,

    pub noc_lines: Vec<NocLineRecord>,
    pub noc_table: Vec<NocTableRecord>,
    pub operators: Vec<OperatorRecord>,
    pub groups: Vec<GroupRecord>,
    pub management_divisions: Vec<ManagementDivisionRecord>,
    pub public_names: Vec<PublicNameRecord>,
}

impl NocTables {
    /// Load `NOCLines.csv`, `NOCTable.csv`, `Operators.csv`, `Groups.csv`,
    /// `ManagementDivisions.csv` and `PublicName.csv` from `dir`. An optional
    /// `GenerationDate.txt` carries the publication date.
    pub fn load_from_dir(dir: &Path) -> Result<Self, SourceError> {
        let generation_date = fs::read_to_string(dir.join("GenerationDate.txt"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let tables = NocTables {
            generation_date,
            noc_lines: read_table(&dir.join("NOCLines.csv"))?,
            noc_table: read_table(&dir.join("NOCTable.csv"))?,
            operators: read_table(&dir.join("Operators.csv"))?,
            groups: read_table(&dir.join("Groups.csv"))?,
            management_divisions: read_table(&dir.join("ManagementDivisions.csv"))?,
            public_names: read_table(&dir.join("PublicName.csv"))?,
        };

        info!(
            dir = %dir.display(),
            noc_lines = tables.noc_lines.len(),
            noc_table = tables.noc_table.len(),
            operators = tables.operators.len(),
            groups = tables.groups.len(),
            management_divisions = tables.management_divisions.len(),
            public_names = tables.public_names.len(),
            "loaded NOC tables"
        );

        Ok(tables)
    }

    /// DataSource stamped on every entity written by this import.
    pub fn datasource(&self, dataset: &str) -> DataSource {
        DataSource::new(ORIGINAL_FORMAT, PROVIDER, dataset).with_identifier(&self.generation_date)
    }

    /// Resolve the tables into filtered Operators and OperatorGroups.
    pub fn resolve(&self, classifier: &ContactClassifier) -> (Vec<Operator>, Vec<OperatorGroup>) {
        let groups = self.resolve_groups();

        let division_groups: HashMap<&str, &str> = self
            .management_divisions
            .iter()
            .map(|d| (d.management_division_id.as_str(), d.group_id.as_str()))
            .collect();

        let mut arena: EntityArena<Operator> = EntityArena::new();
        let mut noc_codes = UniqueIndex::new();
        let mut operator_ids = MultiIndex::new();
        let mut public_name_ids = MultiIndex::new();

        for line in &self.noc_lines {
            let id = arena.find_or_create(&mut noc_codes, &line.noc_code);
            if let Some(operator) = arena.get_mut(id) {
                operator.primary_identifier = format!("{}{}", OPERATOR_ID_PREFIX, line.noc_code);
                operator
                    .other_identifiers
                    .insert("NOC".to_string(), line.noc_code.clone());
                operator.primary_name = line.public_name.clone();
                operator.add_other_name(&line.public_name);
                operator.add_other_name(&line.reference_name);
                operator.licence = line.licence.clone();
                operator.transport_type = vec![line.mode.clone()];
            }
        }

        for row in &self.noc_table {
            let id = arena.find_or_create(&mut noc_codes, &row.noc_code);
            if let Some(operator) = arena.get_mut(id) {
                operator.add_other_name(&row.operator_public_name);
                operator.add_other_name(&row.vosa_psv_license_name);
            }
            operator_ids.register(&row.operator_id, id);
            public_name_ids.register(&row.public_name_id, id);
        }

        for record in &self.operators {
            let ids = arena.find_many_or_create(&mut operator_ids, &record.operator_id);
            let group_ref = match record.management_division_id.as_str() {
                "" => None,
                division => match division_groups.get(division) {
                    Some(group_id) => Some(format!("{}{}", OPERATOR_GROUP_ID_PREFIX, group_id)),
                    None => {
                        warn!(
                            operator_id = %record.operator_id,
                            management_division = division,
                            "unknown management division, leaving group unset"
                        );
                        None
                    }
                },
            };

            arena.update_each(&ids, |operator| {
                operator.add_other_name(&record.operator_name);
                if let Some(group_ref) = &group_ref {
                    operator.operator_group_ref = Some(group_ref.clone());
                }
            });
        }

        for record in &self.public_names {
            let ids = arena.find_many_or_create(&mut public_name_ids, &record.public_name_id);
            arena.update_each(&ids, |operator| {
                apply_public_name(operator, record, classifier);
            });
        }

        let resolved = arena.len();
        let operators = filter::finalize(arena.into_vec());
        info!(
            resolved,
            operators = operators.len(),
            operator_groups = groups.len(),
            "resolved NOC tables"
        );

        (operators, groups)
    }

    fn resolve_groups(&self) -> Vec<OperatorGroup> {
        let groups = self
            .groups
            .iter()
            .filter(|g| {
                if g.group_id.is_empty() {
                    warn!(name = %g.group_name, "group without GrpID, skipping");
                    return false;
                }
                true
            })
            .map(|g| OperatorGroup::from_group_id(&g.group_id, &g.group_name))
            .collect();
        filter::drop_orphans(groups)
    }
}

fn apply_public_name(operator: &mut Operator, record: &PublicNameRecord, classifier: &ContactClassifier) {
    operator.primary_name = record.operator_public_name.clone();
    operator.add_other_name(&record.operator_public_name);

    if let Some(website) = WEBSITE_MARKUP
        .captures(&record.website)
        .and_then(|c| c.get(1))
    {
        operator.website = website.as_str().to_string();
    }

    let mut social_media = BTreeMap::new();
    for (network, handle) in [
        ("Twitter", &record.twitter),
        ("Facebook", &record.facebook),
        ("YouTube", &record.youtube),
    ] {
        if !handle.is_empty() {
            social_media.insert(network.to_string(), handle.clone());
        }
    }
    operator.social_media = social_media;

    for enquiry in [
        &record.lost_property_enquiry,
        &record.disruption_enquiry,
        &record.complaint_enquiry,
        &record.fare_enquiry,
        &record.timetable_route_enquiry,
    ] {
        match classifier.classify(enquiry) {
            Some(ContactField::Email) => operator.email = enquiry.trim().to_string(),
            Some(ContactField::PhoneNumber) => operator.phone_number = enquiry.trim().to_string(),
            Some(ContactField::Address) => operator.address = enquiry.trim().to_string(),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> NocTables {
        NocTables {
            generation_date: "2024-01-01".to_string(),
            groups: vec![GroupRecord {
                group_id: "7".to_string(),
                group_name: "Big Group".to_string(),
            }],
            management_divisions: vec![ManagementDivisionRecord {
                management_division_id: "MD1".to_string(),
                group_id: "7".to_string(),
            }],
            noc_lines: vec![
                NocLineRecord {
                    noc_code: "ABCD".to_string(),
                    public_name: "Line Name".to_string(),
                    reference_name: "Ref Name".to_string(),
                    licence: "PB0001".to_string(),
                    mode: "bus".to_string(),
                },
                NocLineRecord {
                    noc_code: "EFGH".to_string(),
                    public_name: "Other Buses".to_string(),
                    mode: "bus".to_string(),
                    ..Default::default()
                },
            ],
            noc_table: vec![
                NocTableRecord {
                    noc_code: "ABCD".to_string(),
                    operator_public_name: "Line Name".to_string(),
                    vosa_psv_license_name: "ABCD LTD".to_string(),
                    operator_id: "100".to_string(),
                    public_name_id: "P1".to_string(),
                },
                NocTableRecord {
                    noc_code: "EFGH".to_string(),
                    operator_id: "100".to_string(),
                    public_name_id: "P2".to_string(),
                    ..Default::default()
                },
            ],
            operators: vec![
                OperatorRecord {
                    operator_id: "100".to_string(),
                    operator_name: "Shared Operator".to_string(),
                    management_division_id: "MD1".to_string(),
                },
                OperatorRecord {
                    operator_id: "X".to_string(),
                    operator_name: "Nobody".to_string(),
                    ..Default::default()
                },
            ],
            public_names: vec![PublicNameRecord {
                public_name_id: "P1".to_string(),
                operator_public_name: "Public Name".to_string(),
                website: "Home#https://abcd.example#".to_string(),
                twitter: "@abcd".to_string(),
                lost_property_enquiry: "lost@abcd.example".to_string(),
                complaint_enquiry: "0113 000 0000".to_string(),
                fare_enquiry: "https://abcd.example/fares".to_string(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_resolution_precedence() {
        let (operators, groups) = tables().resolve(&ContactClassifier::default());

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].identifier, "GB:NOCGRPID:7");

        let abcd = operators
            .iter()
            .find(|o| o.primary_identifier == "GB:NOC:ABCD")
            .unwrap();

        // PublicName overrides the NOCLines name; earlier names become alternates
        assert_eq!(abcd.primary_name, "Public Name");
        assert_eq!(
            abcd.other_names,
            vec!["Line Name", "Ref Name", "ABCD LTD", "Shared Operator"]
        );
        assert_eq!(abcd.other_identifiers.get("NOC").unwrap(), "ABCD");
        assert_eq!(abcd.operator_group_ref.as_deref(), Some("GB:NOCGRPID:7"));
        assert_eq!(abcd.website, "https://abcd.example");
        assert_eq!(abcd.social_media.get("Twitter").unwrap(), "@abcd");
        assert_eq!(abcd.email, "lost@abcd.example");
        assert_eq!(abcd.phone_number, "0113 000 0000");
        assert!(abcd.address.is_empty());
        assert_eq!(abcd.transport_type, vec!["bus"]);

        println!("✅ NOC resolution precedence test PASSED");
    }

    #[test]
    fn test_shared_operator_id_reaches_every_operator() {
        let (operators, _) = tables().resolve(&ContactClassifier::default());
        let efgh = operators
            .iter()
            .find(|o| o.primary_identifier == "GB:NOC:EFGH")
            .unwrap();

        assert!(efgh.other_names.contains(&"Shared Operator".to_string()));
        assert_eq!(efgh.operator_group_ref.as_deref(), Some("GB:NOCGRPID:7"));
    }

    #[test]
    fn test_orphans_are_excluded() {
        // OpId "X" and PubNmId "P2" have no defining NOC rows
        let (operators, _) = tables().resolve(&ContactClassifier::default());

        assert_eq!(operators.len(), 2);
        assert!(operators.iter().all(|o| !o.primary_identifier.is_empty()));
    }

    #[test]
    fn test_unknown_division_leaves_group_unset() {
        let mut tables = tables();
        tables.operators[0].management_division_id = "MISSING".to_string();

        let (operators, _) = tables.resolve(&ContactClassifier::default());

        assert!(operators.iter().all(|o| o.operator_group_ref.is_none()));
    }

    #[test]
    fn test_repeated_group_id_yields_one_group() {
        let mut tables = tables();
        tables.groups = vec![
            GroupRecord {
                group_id: "1".to_string(),
                group_name: "First".to_string(),
            },
            GroupRecord {
                group_id: "2".to_string(),
                group_name: "Second".to_string(),
            },
            GroupRecord {
                group_id: "1".to_string(),
                group_name: "First Renamed".to_string(),
            },
        ];

        let (_, groups) = tables.resolve(&ContactClassifier::default());

        let ids: Vec<&str> = groups.iter().map(|g| g.identifier.as_str()).collect();
        assert_eq!(ids, vec!["GB:NOCGRPID:1", "GB:NOCGRPID:2"]);
        assert_eq!(groups[0].name, "First Renamed");
    }

    #[test]
    fn test_datasource_uses_generation_date() {
        let ds = tables().datasource("NOC.csv");
        assert_eq!(ds.identifier, "2024-01-01");
        assert_eq!(ds.original_format, "traveline-noc");
        assert_eq!(ds.provider, "Traveline");
    }
}
