use crate::state::split_entity_id;
use serde::Deserialize;

/// Include/exclude exposure filter
///
/// * empty filter: everything is exposed
/// * includes only: listed entities and domains
/// * excludes only: everything not listed
/// * both: entity-level lists win, then the included domains decide
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityFilter {
    #[serde(default)]
    pub include_domains: Vec<String>,
    #[serde(default)]
    pub include_entities: Vec<String>,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    #[serde(default)]
    pub exclude_entities: Vec<String>,
}

impl EntityFilter {
    pub fn matches(&self, entity_id: &str) -> bool {
        let domain = split_entity_id(entity_id).0;
        let has_includes = !self.include_domains.is_empty() || !self.include_entities.is_empty();
        let has_excludes = !self.exclude_domains.is_empty() || !self.exclude_entities.is_empty();

        let included_entity = self.include_entities.iter().any(|e| e == entity_id);
        let excluded_entity = self.exclude_entities.iter().any(|e| e == entity_id);
        let included_domain = self.include_domains.iter().any(|d| d == domain);
        let excluded_domain = self.exclude_domains.iter().any(|d| d == domain);

        match (has_includes, has_excludes) {
            (false, false) => true,
            (true, false) => included_entity || included_domain,
            (false, true) => !(excluded_entity || excluded_domain),
            (true, true) => {
                if included_entity {
                    true
                } else if excluded_entity {
                    false
                } else if !self.include_domains.is_empty() {
                    included_domain
                } else {
                    !excluded_domain
                }
            }
        }
    }
}
