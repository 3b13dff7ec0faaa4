use crate::core::mapping::MappingStore;
use crate::core::matcher::FieldMatcher;
use crate::core::synthesis::SynthesisEngine;
use crate::domain::keys::{SourceKey, TemplateKey};
use crate::domain::model::{Sheet, Workbook, WorkbookId};
use crate::domain::options::GenerationMode;
use crate::utils::error::{ReconcileError, Result};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// 切換到不同的作用中來源檔時清空映射
    pub reset_on_source_switch: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reset_on_source_switch: true,
        }
    }
}

/// 一次對照作業的狀態：模板、已載入的來源、選取順序、作用中的來源與映射。
///
/// 所有「輸入改變後重新計算」都由呼叫端明確觸發：
/// 換模板或換作用中來源後會重新自動配對，其他時候映射只會被明確修改。
#[derive(Debug, Clone, Default)]
pub struct ReconcileSession {
    template: Option<Workbook>,
    sources: Vec<Workbook>,
    selected: Vec<WorkbookId>,
    active: Option<WorkbookId>,
    mapping: MappingStore,
    matcher: FieldMatcher,
    options: SessionOptions,
}

impl ReconcileSession {
    pub fn new(matcher: FieldMatcher, options: SessionOptions) -> Self {
        Self {
            matcher,
            options,
            ..Self::default()
        }
    }

    pub fn template(&self) -> Option<&Workbook> {
        self.template.as_ref()
    }

    /// 取代模板並重新自動配對。既有的映射保留，不再存在的欄位只是不會被使用。
    pub fn set_template(&mut self, template: Workbook) -> usize {
        tracing::debug!(
            "📋 Template set: '{}' ({} sheet(s))",
            template.display_name(),
            template.sheets.len()
        );
        self.template = Some(template);
        self.auto_match()
    }

    /// 載入並選取來源檔；第一個載入的來源成為作用中的來源
    pub fn add_source(&mut self, source: Workbook) -> Result<WorkbookId> {
        if self.source(&source.id).is_some() {
            return Err(ReconcileError::DuplicateSource { id: source.id });
        }

        let id = source.id.clone();
        tracing::debug!(
            "📥 Source added: '{}' ({} sheet(s), {} rows)",
            source.display_name(),
            source.sheets.len(),
            source.total_rows()
        );
        self.sources.push(source);
        self.selected.push(id.clone());

        if self.active.is_none() {
            self.activate(Some(id.clone()));
        }
        Ok(id)
    }

    pub fn remove_source(&mut self, id: &str) -> Result<()> {
        self.require_source(id)?;

        self.sources.retain(|source| source.id != id);
        self.selected.retain(|selected| selected != id);

        if self.active.as_deref() == Some(id) {
            let next = self.selected.first().cloned();
            self.activate(next);
        }
        Ok(())
    }

    /// 加到選取順序的末端；已選取則不變
    pub fn select_source(&mut self, id: &str) -> Result<()> {
        self.require_source(id)?;
        if !self.selected.iter().any(|selected| selected == id) {
            self.selected.push(id.to_string());
        }
        Ok(())
    }

    /// 取消選取作用中的來源時，作用中的來源移到第一個仍被選取的來源
    pub fn deselect_source(&mut self, id: &str) -> Result<()> {
        self.require_source(id)?;
        self.selected.retain(|selected| selected != id);

        if self.active.as_deref() == Some(id) {
            let next = self.selected.first().cloned();
            self.activate(next);
        }
        Ok(())
    }

    /// 切換作用中的來源，回傳自動配對新增的筆數。
    /// 尚未選取的來源會一併被選取。
    pub fn set_active_source(&mut self, id: &str) -> Result<usize> {
        self.select_source(id)?;
        Ok(self.activate(Some(id.to_string())))
    }

    fn activate(&mut self, next: Option<WorkbookId>) -> usize {
        let switching = self.active.is_some() && self.active != next;
        if switching && self.options.reset_on_source_switch {
            tracing::info!(
                "🔄 Active source changed from {:?} to {:?}, mapping reset",
                self.active,
                next
            );
            self.mapping.reset();
        }

        self.active = next;
        self.auto_match()
    }

    pub fn active_source(&self) -> Option<&Workbook> {
        self.active.as_deref().and_then(|id| self.source(id))
    }

    pub fn selected_sources(&self) -> Vec<&Workbook> {
        self.selected
            .iter()
            .filter_map(|id| self.source(id))
            .collect()
    }

    /// 以作用中來源的工作表為候選執行自動配對；缺少模板或來源時不做事
    pub fn auto_match(&mut self) -> usize {
        let Some(template) = self.template.as_ref() else {
            return 0;
        };
        let Some(active) = self
            .active
            .as_deref()
            .and_then(|id| self.sources.iter().find(|source| source.id == id))
        else {
            return 0;
        };

        let candidates: Vec<&Sheet> = active.sheets.iter().collect();
        let added = self
            .matcher
            .auto_match(template, &candidates, &mut self.mapping);
        if added > 0 {
            tracing::info!(
                "🔗 Auto-matched {} field(s) against '{}'",
                added,
                active.display_name()
            );
        }
        added
    }

    pub fn set_mapping(&mut self, template: TemplateKey, source: SourceKey) {
        self.mapping.set(template, source);
    }

    pub fn clear_mapping(&mut self, template: &TemplateKey) {
        self.mapping.clear(template);
    }

    pub fn mapping(&self) -> &MappingStore {
        &self.mapping
    }

    /// Mode A 以作用中的來源優先，Mode B 依選取順序使用所有選取的來源
    pub fn generate(&self, engine: &SynthesisEngine, mode: GenerationMode) -> Result<Workbook> {
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| ReconcileError::MissingConfigError {
                field: "template".to_string(),
            })?;

        let selected = self.selected_sources();
        let sources: Vec<&Workbook> = match mode {
            GenerationMode::PerSheet => self
                .active_source()
                .into_iter()
                .chain(
                    selected
                        .iter()
                        .copied()
                        .filter(|source| Some(source.id.as_str()) != self.active.as_deref()),
                )
                .collect(),
            GenerationMode::ColumnarMerge => selected,
        };

        if sources.is_empty() {
            return Err(ReconcileError::NoSources);
        }

        engine.synthesize(mode, template, &self.mapping, &sources)
    }

    pub fn reset(&mut self) {
        self.template = None;
        self.sources.clear();
        self.selected.clear();
        self.active = None;
        self.mapping.reset();
    }

    fn source(&self, id: &str) -> Option<&Workbook> {
        self.sources.iter().find(|source| source.id == id)
    }

    fn require_source(&self, id: &str) -> Result<()> {
        match self.source(id) {
            Some(_) => Ok(()),
            None => Err(ReconcileError::UnknownSource { id: id.to_string() }),
        }
    }
}
