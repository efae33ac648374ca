use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db::{ColumnFamily, CompositeKey, DbError, DbResult, KeyedStateStore};
use crate::record::MappingRuleRecord;

use super::ColumnFamilies;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMappingRule {
    pub mapping_rule_key: i64,
    pub mapping_rule_id: String,
    pub claim_name: String,
    pub claim_value: String,
    #[serde(default)]
    pub name: String,
    /// Groups this mapping rule was added to
    #[serde(default)]
    pub group_ids: BTreeSet<String>,
}

/// Mapping rules by id, plus a unique index on (claim name, claim value).
pub struct MappingRuleState {
    mapping_rules: ColumnFamily<String, PersistedMappingRule>,
    by_claim: ColumnFamily<CompositeKey<String, String>, String>,
}

impl MappingRuleState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            mapping_rules: store.create_column_family(ColumnFamilies::MappingRules),
            by_claim: store.create_column_family(ColumnFamilies::MappingRulesByClaim),
        }
    }

    pub fn get(&self, mapping_rule_id: &str) -> DbResult<Option<PersistedMappingRule>> {
        self.mapping_rules.get(&mapping_rule_id.to_string())
    }

    pub fn exists(&self, mapping_rule_id: &str) -> DbResult<bool> {
        self.mapping_rules.exists(&mapping_rule_id.to_string())
    }

    /// Id of the mapping rule matching the claim, if any.
    pub fn find_by_claim(&self, claim_name: &str, claim_value: &str) -> DbResult<Option<String>> {
        self.by_claim
            .get(&CompositeKey::new(claim_name.to_string(), claim_value.to_string()))
    }

    pub fn create(&mut self, key: i64, rule: &MappingRuleRecord) -> DbResult<()> {
        self.mapping_rules.insert(
            &rule.mapping_rule_id,
            &PersistedMappingRule {
                mapping_rule_key: key,
                mapping_rule_id: rule.mapping_rule_id.clone(),
                claim_name: rule.claim_name.clone(),
                claim_value: rule.claim_value.clone(),
                name: rule.name.clone(),
                group_ids: BTreeSet::new(),
            },
        )?;
        self.by_claim.insert(
            &CompositeKey::new(rule.claim_name.clone(), rule.claim_value.clone()),
            &rule.mapping_rule_id,
        )
    }

    pub fn delete(&mut self, mapping_rule_id: &str) -> DbResult<()> {
        if let Some(rule) = self.get(mapping_rule_id)? {
            self.by_claim
                .delete_if_exists(&CompositeKey::new(rule.claim_name, rule.claim_value))?;
        }
        self.mapping_rules
            .delete_existing(&mapping_rule_id.to_string())
    }

    pub fn add_group(&mut self, mapping_rule_id: &str, group_id: &str) -> DbResult<()> {
        self.modify(mapping_rule_id, |rule| {
            rule.group_ids.insert(group_id.to_string());
        })
    }

    pub fn remove_group(&mut self, mapping_rule_id: &str, group_id: &str) -> DbResult<()> {
        self.modify(mapping_rule_id, |rule| {
            rule.group_ids.remove(group_id);
        })
    }

    fn modify<F>(&mut self, mapping_rule_id: &str, change: F) -> DbResult<()>
    where
        F: FnOnce(&mut PersistedMappingRule),
    {
        let key = mapping_rule_id.to_string();
        let mut rule = self.mapping_rules.get(&key)?.ok_or_else(|| DbError::KeyNotFound {
            column_family: self.mapping_rules.name(),
            key: key.clone(),
        })?;
        change(&mut rule);
        self.mapping_rules.update(&key, &rule)
    }
}
