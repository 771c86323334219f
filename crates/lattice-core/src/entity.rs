use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize an entity name for merge keys: lowercase, whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Company,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Company => "Company",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Person" => Some(EntityKind::Person),
            "Company" => Some(EntityKind::Company),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source_chunk_ids: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompanyEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source_chunk_ids: Vec<usize>,
}

/// A typed entity produced by extraction, before staging review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedEntity {
    Person(PersonEntity),
    Company(CompanyEntity),
}

impl ExtractedEntity {
    pub fn name(&self) -> &str {
        match self {
            ExtractedEntity::Person(p) => &p.name,
            ExtractedEntity::Company(c) => &c.name,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ExtractedEntity::Person(_) => EntityKind::Person,
            ExtractedEntity::Company(_) => EntityKind::Company,
        }
    }

    pub fn source_chunk_ids(&self) -> &[usize] {
        match self {
            ExtractedEntity::Person(p) => &p.source_chunk_ids,
            ExtractedEntity::Company(c) => &c.source_chunk_ids,
        }
    }

    /// Union-merge `other` into `self`: fill empty attributes, union chunk
    /// provenance, keep the longer summary. Existing non-null values win.
    pub fn absorb(&mut self, other: &ExtractedEntity) {
        match (self, other) {
            (ExtractedEntity::Person(a), ExtractedEntity::Person(b)) => {
                fill_opt(&mut a.position, &b.position);
                fill_opt(&mut a.company, &b.company);
                fill_opt(&mut a.department, &b.department);
                fill_opt(&mut a.start_date, &b.start_date);
                fill_opt(&mut a.nationality, &b.nationality);
                for skill in &b.skills {
                    if !a.skills.contains(skill) {
                        a.skills.push(skill.clone());
                    }
                }
                if b.summary.len() > a.summary.len() {
                    a.summary = b.summary.clone();
                }
                union_chunks(&mut a.source_chunk_ids, &b.source_chunk_ids);
            }
            (ExtractedEntity::Company(a), ExtractedEntity::Company(b)) => {
                fill_opt(&mut a.industry, &b.industry);
                fill_opt(&mut a.founded_year, &b.founded_year);
                fill_opt(&mut a.headquarters, &b.headquarters);
                fill_opt(&mut a.employee_count, &b.employee_count);
                fill_opt(&mut a.website, &b.website);
                if b.summary.len() > a.summary.len() {
                    a.summary = b.summary.clone();
                }
                union_chunks(&mut a.source_chunk_ids, &b.source_chunk_ids);
            }
            _ => {}
        }
    }
}

fn fill_opt<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if dst.is_none() {
        *dst = src.clone();
    }
}

fn union_chunks(dst: &mut Vec<usize>, src: &[usize]) {
    for id in src {
        if !dst.contains(id) {
            dst.push(*id);
        }
    }
    dst.sort_unstable();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Employment,
    Leadership,
    Investment,
    Partnership,
    Ownership,
}

impl EdgeKind {
    pub fn neo4j_type(&self) -> &'static str {
        match self {
            EdgeKind::Employment => "EMPLOYMENT",
            EdgeKind::Leadership => "LEADERSHIP",
            EdgeKind::Investment => "INVESTMENT",
            EdgeKind::Partnership => "PARTNERSHIP",
            EdgeKind::Ownership => "OWNERSHIP",
        }
    }

    pub fn from_neo4j_type(s: &str) -> Option<Self> {
        match s {
            "EMPLOYMENT" => Some(EdgeKind::Employment),
            "LEADERSHIP" => Some(EdgeKind::Leadership),
            "INVESTMENT" => Some(EdgeKind::Investment),
            "PARTNERSHIP" => Some(EdgeKind::Partnership),
            "OWNERSHIP" => Some(EdgeKind::Ownership),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "employment" | "works_at" | "employee_of" => Some(EdgeKind::Employment),
            "leadership" | "leads" | "ceo_of" | "executive_of" => Some(EdgeKind::Leadership),
            "investment" | "invests_in" | "invested_in" => Some(EdgeKind::Investment),
            "partnership" | "partners_with" => Some(EdgeKind::Partnership),
            "ownership" | "owns" | "subsidiary" => Some(EdgeKind::Ownership),
            _ => None,
        }
    }

    /// The edge-type map: which kinds may connect a (source, target) pair.
    pub fn allowed_between(source: EntityKind, target: EntityKind) -> &'static [EdgeKind] {
        match (source, target) {
            (EntityKind::Person, EntityKind::Company) => {
                &[EdgeKind::Employment, EdgeKind::Leadership]
            }
            (EntityKind::Company, EntityKind::Company) => {
                &[EdgeKind::Partnership, EdgeKind::Investment, EdgeKind::Ownership]
            }
            (EntityKind::Person, EntityKind::Person) => &[EdgeKind::Partnership],
            (EntityKind::Company, EntityKind::Person) => &[],
        }
    }

    pub fn permits(&self, source: EntityKind, target: EntityKind) -> bool {
        Self::allowed_between(source, target).contains(self)
    }
}

/// Classify a job title: executive titles map to Leadership, the rest to
/// Employment. Used by the property-based relationship fallback.
pub fn edge_kind_for_position(position: &str) -> EdgeKind {
    let lower = position.to_lowercase();
    const LEADERSHIP_MARKERS: &[&str] = &["ceo", "chief", "president", "chair", "founder", "cto", "cfo", "coo"];
    if LEADERSHIP_MARKERS.iter().any(|m| lower.contains(m)) {
        EdgeKind::Leadership
    } else {
        EdgeKind::Employment
    }
}

/// A typed relationship between two named entities, with temporal validity.
///
/// Uniqueness key in the graph: (kind, source, target, valid_at).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypedEdge {
    pub kind: EdgeKind,
    pub source_name: String,
    pub source_kind: EntityKind,
    pub target_name: String,
    pub target_kind: EntityKind,
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_at: Option<DateTime<Utc>>,
    pub fact_text: String,
    #[serde(default)]
    pub source_chunk_ids: Vec<usize>,
}

impl TypedEdge {
    pub fn endpoints_valid(&self) -> bool {
        self.kind.permits(self.source_kind, self.target_kind)
    }

    /// Merge key used by the graph writer. For (Person, Person) Partnership
    /// the endpoint keys are ordered so direction does not split the edge.
    pub fn merge_key(&self) -> (EdgeKind, String, String, Option<DateTime<Utc>>) {
        let src = normalize_name(&self.source_name);
        let tgt = normalize_name(&self.target_name);
        if self.kind == EdgeKind::Partnership
            && self.source_kind == EntityKind::Person
            && self.target_kind == EntityKind::Person
            && tgt < src
        {
            (self.kind, tgt, src, self.valid_at)
        } else {
            (self.kind, src, tgt, self.valid_at)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  John   SMITH "), "john smith");
        assert_eq!(normalize_name("TechCorp\tInc."), "techcorp inc.");
    }

    #[test]
    fn edge_type_map_person_company() {
        assert!(EdgeKind::Employment.permits(EntityKind::Person, EntityKind::Company));
        assert!(EdgeKind::Leadership.permits(EntityKind::Person, EntityKind::Company));
        assert!(!EdgeKind::Investment.permits(EntityKind::Person, EntityKind::Company));
    }

    #[test]
    fn edge_type_map_rejects_company_person() {
        for kind in [
            EdgeKind::Employment,
            EdgeKind::Leadership,
            EdgeKind::Investment,
            EdgeKind::Partnership,
            EdgeKind::Ownership,
        ] {
            assert!(!kind.permits(EntityKind::Company, EntityKind::Person));
        }
    }

    #[test]
    fn edge_type_map_company_company() {
        assert!(EdgeKind::Investment.permits(EntityKind::Company, EntityKind::Company));
        assert!(EdgeKind::Ownership.permits(EntityKind::Company, EntityKind::Company));
        assert!(!EdgeKind::Employment.permits(EntityKind::Company, EntityKind::Company));
    }

    #[test]
    fn position_classifier() {
        assert_eq!(edge_kind_for_position("CEO"), EdgeKind::Leadership);
        assert_eq!(edge_kind_for_position("Chief Technology Officer"), EdgeKind::Leadership);
        assert_eq!(edge_kind_for_position("Vice President"), EdgeKind::Leadership);
        assert_eq!(edge_kind_for_position("Chairwoman"), EdgeKind::Leadership);
        assert_eq!(edge_kind_for_position("Software Engineer"), EdgeKind::Employment);
        assert_eq!(edge_kind_for_position("Analyst"), EdgeKind::Employment);
    }

    #[test]
    fn absorb_fills_missing_and_unions_chunks() {
        let mut a = ExtractedEntity::Person(PersonEntity {
            name: "John Smith".into(),
            position: Some("CEO".into()),
            source_chunk_ids: vec![0],
            ..Default::default()
        });
        let b = ExtractedEntity::Person(PersonEntity {
            name: "John Smith".into(),
            position: Some("Chief Executive".into()),
            company: Some("TechCorp Inc.".into()),
            summary: "CEO of TechCorp".into(),
            source_chunk_ids: vec![2, 0],
            ..Default::default()
        });
        a.absorb(&b);
        let ExtractedEntity::Person(p) = a else { panic!() };
        // Existing non-null value preserved.
        assert_eq!(p.position.as_deref(), Some("CEO"));
        assert_eq!(p.company.as_deref(), Some("TechCorp Inc."));
        assert_eq!(p.summary, "CEO of TechCorp");
        assert_eq!(p.source_chunk_ids, vec![0, 2]);
    }

    #[test]
    fn person_partnership_merge_key_is_direction_stable() {
        let make = |src: &str, tgt: &str| TypedEdge {
            kind: EdgeKind::Partnership,
            source_name: src.into(),
            source_kind: EntityKind::Person,
            target_name: tgt.into(),
            target_kind: EntityKind::Person,
            attributes: serde_json::json!({}),
            confidence: 1.0,
            valid_at: None,
            invalid_at: None,
            fact_text: String::new(),
            source_chunk_ids: vec![],
        };
        assert_eq!(make("Alice", "Bob").merge_key(), make("Bob", "Alice").merge_key());
    }

    #[test]
    fn company_edge_merge_key_keeps_direction() {
        let edge = TypedEdge {
            kind: EdgeKind::Investment,
            source_name: "Sequoia Capital".into(),
            source_kind: EntityKind::Company,
            target_name: "TechCorp Inc.".into(),
            target_kind: EntityKind::Company,
            attributes: serde_json::json!({"amount": "$50M"}),
            confidence: 0.9,
            valid_at: None,
            invalid_at: None,
            fact_text: "Sequoia led TechCorp's Series A".into(),
            source_chunk_ids: vec![0],
        };
        let (kind, src, tgt, _) = edge.merge_key();
        assert_eq!(kind, EdgeKind::Investment);
        assert_eq!(src, "sequoia capital");
        assert_eq!(tgt, "techcorp inc.");
    }
}
