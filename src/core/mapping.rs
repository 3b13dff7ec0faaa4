use crate::domain::keys::{MappingEntry, SourceKey, TemplateKey};
use indexmap::IndexMap;
use std::collections::HashSet;

/// 目前的欄位映射：每個模板欄位槽最多一個來源欄。
///
/// 這一層不檢查來源欄是否重複使用；避免重複選取是呈現層的責任。
/// 插入順序即 Mode B 的輸出欄順序。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingStore {
    entries: IndexMap<TemplateKey, SourceKey>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = MappingEntry>,
    {
        let mut store = Self::new();
        for entry in entries {
            store.set(entry.template, entry.source);
        }
        store
    }

    /// 無條件寫入，後寫者勝；覆寫既有的鍵時保留它原本的位置
    pub fn set(&mut self, template: TemplateKey, source: SourceKey) {
        self.entries.insert(template, source);
    }

    pub fn clear(&mut self, template: &TemplateKey) {
        self.entries.shift_remove(template);
    }

    pub fn get(&self, template: &TemplateKey) -> Option<&SourceKey> {
        self.entries.get(template)
    }

    /// 所有已被綁定的來源欄，供呈現層把已使用的選項標灰
    pub fn selected_source_keys(&self) -> HashSet<SourceKey> {
        self.entries.values().cloned().collect()
    }

    pub fn has_mapping_for_sheet(&self, sheet: &str) -> bool {
        self.entries.keys().any(|key| key.sheet == sheet)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TemplateKey, &SourceKey)> {
        self.entries.iter()
    }

    pub fn entries(&self) -> Vec<MappingEntry> {
        self.entries
            .iter()
            .map(|(template, source)| MappingEntry {
                template: template.clone(),
                source: source.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 整個取代（不合併），用於切換作用中的來源檔
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
