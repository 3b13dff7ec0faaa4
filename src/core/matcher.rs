use crate::core::mapping::MappingStore;
use crate::domain::keys::{SourceKey, TemplateKey};
use crate::domain::model::{Sheet, Workbook};
use crate::domain::options::UniquenessPolicy;
use std::collections::HashSet;

/// 第一層比對：轉小寫並去除前後空白
pub fn exact_normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// 第二層比對：轉小寫後只保留 `[a-z0-9]`
pub fn loose_normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Loose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub source: SourceKey,
    pub tier: MatchTier,
}

/// 為模板欄位提出預設的來源欄對應
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMatcher {
    policy: UniquenessPolicy,
}

impl FieldMatcher {
    pub fn new(policy: UniquenessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UniquenessPolicy {
        self.policy
    }

    /// 依序嘗試兩層比對，第一個成功者勝出；每層都依候選工作表的順序掃描。
    /// `claimed` 只在 `Exclusive` 政策下生效。
    pub fn find_match(
        &self,
        template_field: &str,
        candidates: &[&Sheet],
        claimed: &HashSet<SourceKey>,
    ) -> Option<FieldMatch> {
        let exact = exact_normalize(template_field);
        if let Some(source) = self.scan(candidates, claimed, |name| exact_normalize(name) == exact) {
            return Some(FieldMatch {
                source,
                tier: MatchTier::Exact,
            });
        }

        let loose = loose_normalize(template_field);
        self.scan(candidates, claimed, |name| loose_normalize(name) == loose)
            .map(|source| FieldMatch {
                source,
                tier: MatchTier::Loose,
            })
    }

    fn scan<F>(
        &self,
        candidates: &[&Sheet],
        claimed: &HashSet<SourceKey>,
        matches: F,
    ) -> Option<SourceKey>
    where
        F: Fn(&str) -> bool,
    {
        candidates.iter().find_map(|sheet| {
            sheet
                .headers
                .iter()
                .filter(|header| matches(&header.name))
                .map(|header| SourceKey::new(&sheet.name, &header.name))
                .find(|key| self.policy == UniquenessPolicy::Shared || !claimed.contains(key))
        })
    }

    /// 對模板中所有尚未映射的欄位執行自動配對，回傳新增的筆數。
    /// 已存在的映射（不論自動或手動設定）永遠不會被覆寫。
    pub fn auto_match(
        &self,
        template: &Workbook,
        candidates: &[&Sheet],
        store: &mut MappingStore,
    ) -> usize {
        // 只以 (工作表, 欄位) 判定是否已被佔用，限定範圍的手動綁定也算
        let mut claimed: HashSet<SourceKey> = store
            .selected_source_keys()
            .into_iter()
            .map(|key| SourceKey::new(key.sheet, key.field))
            .collect();
        let mut added = 0;

        for sheet in &template.sheets {
            for header in &sheet.headers {
                let key = TemplateKey::new(&sheet.name, &header.name);
                if store.get(&key).is_some() {
                    continue;
                }

                match self.find_match(&header.name, candidates, &claimed) {
                    Some(found) => {
                        tracing::debug!(
                            "🔗 {} -> {} ({:?} match)",
                            key,
                            found.source,
                            found.tier
                        );
                        claimed.insert(found.source.clone());
                        store.set(key, found.source);
                        added += 1;
                    }
                    None => tracing::debug!("⚪ {} left unmapped", key),
                }
            }
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, headers: &[&str]) -> Sheet {
        Sheet::new(name, "src").with_headers(headers.iter().copied())
    }

    fn template(headers: &[&str]) -> Workbook {
        Workbook::new("template").with_sheet(sheet("Target", headers))
    }

    #[test]
    fn test_exact_match_ignores_case_and_padding() {
        let people = sheet("People", &["  full name ", "Email"]);
        let matcher = FieldMatcher::default();

        let found = matcher
            .find_match("Full Name", &[&people], &HashSet::new())
            .unwrap();
        assert_eq!(found.tier, MatchTier::Exact);
        assert_eq!(found.source, SourceKey::new("People", "  full name "));
    }

    #[test]
    fn test_loose_match_strips_punctuation() {
        let people = sheet("People", &["first_name", "E-Mail"]);
        let matcher = FieldMatcher::default();

        let found = matcher
            .find_match("First Name", &[&people], &HashSet::new())
            .unwrap();
        assert_eq!(found.tier, MatchTier::Loose);
        assert_eq!(found.source.field, "first_name");

        let found = matcher.find_match("email", &[&people], &HashSet::new()).unwrap();
        assert_eq!(found.source.field, "E-Mail");
    }

    #[test]
    fn test_exact_tier_beats_earlier_loose_candidate() {
        // 第一個工作表只有寬鬆相符，第二個有精確相符：精確優先
        let first = sheet("A", &["e_mail"]);
        let second = sheet("B", &["Email"]);
        let matcher = FieldMatcher::default();

        let found = matcher
            .find_match("email", &[&first, &second], &HashSet::new())
            .unwrap();
        assert_eq!(found.source, SourceKey::new("B", "Email"));
    }

    #[test]
    fn test_first_sheet_wins_within_a_tier() {
        let first = sheet("A", &["Name"]);
        let second = sheet("B", &["Name"]);
        let matcher = FieldMatcher::default();

        let found = matcher
            .find_match("name", &[&first, &second], &HashSet::new())
            .unwrap();
        assert_eq!(found.source.sheet, "A");
    }

    #[test]
    fn test_symbol_only_names_loose_match_each_other() {
        // 兩邊正規化後都是空字串，仍視為相符
        let odd = sheet("A", &["#"]);
        let matcher = FieldMatcher::default();
        let found = matcher.find_match("%", &[&odd], &HashSet::new()).unwrap();
        assert_eq!(found.tier, MatchTier::Loose);
    }

    #[test]
    fn test_exclusive_policy_skips_claimed_sources() {
        let people = sheet("People", &["Name", "name_2"]);
        let template = template(&["Name", "NAME"]);
        let mut store = MappingStore::new();

        let added = FieldMatcher::new(UniquenessPolicy::Exclusive).auto_match(
            &template,
            &[&people],
            &mut store,
        );

        assert_eq!(added, 1);
        assert_eq!(
            store.get(&TemplateKey::new("Target", "Name")),
            Some(&SourceKey::new("People", "Name"))
        );
        assert!(store.get(&TemplateKey::new("Target", "NAME")).is_none());
    }

    #[test]
    fn test_shared_policy_reuses_sources() {
        let people = sheet("People", &["Name"]);
        let template = template(&["Name", "NAME"]);
        let mut store = MappingStore::new();

        let added =
            FieldMatcher::new(UniquenessPolicy::Shared).auto_match(&template, &[&people], &mut store);

        assert_eq!(added, 2);
        assert_eq!(store.selected_source_keys().len(), 1);
    }

    #[test]
    fn test_auto_match_is_idempotent() {
        let people = sheet("People", &["Name", "Email", "Phone"]);
        let template = template(&["name", "E mail", "Fax"]);
        let matcher = FieldMatcher::default();

        let mut store = MappingStore::new();
        assert_eq!(matcher.auto_match(&template, &[&people], &mut store), 2);
        let first_pass = store.clone();

        assert_eq!(matcher.auto_match(&template, &[&people], &mut store), 0);
        assert_eq!(store, first_pass);
    }

    #[test]
    fn test_auto_match_never_overwrites_existing_entry() {
        let people = sheet("People", &["Name", "Nickname"]);
        let template = template(&["Name"]);
        let key = TemplateKey::new("Target", "Name");

        let mut store = MappingStore::new();
        store.set(key.clone(), SourceKey::new("People", "Nickname"));

        let added = FieldMatcher::default().auto_match(&template, &[&people], &mut store);

        assert_eq!(added, 0);
        assert_eq!(store.get(&key), Some(&SourceKey::new("People", "Nickname")));
    }

    #[test]
    fn test_existing_bindings_count_as_claimed() {
        let people = sheet("People", &["Name"]);
        let template = template(&["Name", "Label"]);

        let mut store = MappingStore::new();
        store.set(
            TemplateKey::new("Target", "Label"),
            SourceKey::new("People", "Name"),
        );

        let added = FieldMatcher::default().auto_match(&template, &[&people], &mut store);
        assert_eq!(added, 0);
        assert!(store.get(&TemplateKey::new("Target", "Name")).is_none());
    }

    #[test]
    fn test_scoped_binding_claims_the_column() {
        let people = sheet("People", &["Name"]);
        let template = template(&["Name", "Label"]);

        let mut store = MappingStore::new();
        store.set(
            TemplateKey::new("Target", "Label"),
            SourceKey::new("People", "Name").scoped("a.xlsx"),
        );

        let added = FieldMatcher::default().auto_match(&template, &[&people], &mut store);
        assert_eq!(added, 0);
        assert!(store.get(&TemplateKey::new("Target", "Name")).is_none());
    }
}
