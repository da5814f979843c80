//! Sheet Classifier
//!
//! Picks the sheets that look like simulation-report output by matching their
//! names against a vocabulary of known export sheet identifiers.
//! Matching is case-sensitive. The default rule is substring containment in
//! either direction, so `AcrossReplicationsSummary (2)` and `CounterStats`
//! both match their vocabulary entries.

use serde::{Deserialize, Serialize};

use crate::models::{Sheet, SheetStore};

/// What a vocabulary sheet contributes to the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetRole {
    /// Across-replication summary; ground truth for the report
    Summary,
    /// Per-replication counters, discrete-time or frequency statistics
    ReplicationDetail,
    /// Project information and run metadata
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Sheet name contains the id, or the id contains the sheet name
    #[default]
    Containment,
    /// Sheet name equals the id
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    pub role: SheetRole,
    #[serde(default)]
    pub rule: MatchRule,
}

impl VocabularyEntry {
    pub fn new(id: impl Into<String>, role: SheetRole) -> Self {
        Self {
            id: id.into(),
            role,
            rule: MatchRule::Containment,
        }
    }

    pub fn exact(mut self) -> Self {
        self.rule = MatchRule::Exact;
        self
    }

    /// Empty sheet names never match; containment would otherwise accept them everywhere.
    pub fn matches(&self, sheet_name: &str) -> bool {
        if sheet_name.is_empty() {
            return false;
        }
        match self.rule {
            MatchRule::Exact => sheet_name == self.id,
            MatchRule::Containment => {
                sheet_name.contains(self.id.as_str()) || self.id.contains(sheet_name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetVocabulary {
    entries: Vec<VocabularyEntry>,
}

impl Default for SheetVocabulary {
    fn default() -> Self {
        Self::new(vec![
            VocabularyEntry::new("ProjectInformation", SheetRole::Metadata),
            VocabularyEntry::new("AcrossReplicationsSummary", SheetRole::Summary),
            VocabularyEntry::new("DiscreteTimeStatsByRep", SheetRole::ReplicationDetail),
            VocabularyEntry::new("CounterStatsByRep", SheetRole::ReplicationDetail),
            VocabularyEntry::new("OutputStatByStep", SheetRole::ReplicationDetail),
            VocabularyEntry::new("FrequencyStatsByRep", SheetRole::ReplicationDetail),
        ])
    }
}

impl SheetVocabulary {
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry matching `sheet_name`, in vocabulary order.
    pub fn lookup(&self, sheet_name: &str) -> Option<&VocabularyEntry> {
        self.entries.iter().find(|e| e.matches(sheet_name))
    }
}

/// A sheet selected by the classifier together with the entry that claimed it.
#[derive(Debug, Clone, Copy)]
pub struct MatchedSheet<'a> {
    pub sheet: &'a Sheet,
    pub entry: &'a VocabularyEntry,
}

#[derive(Debug, Clone)]
pub struct Classification<'a> {
    /// Matched sheets, in workbook order
    pub matched: Vec<MatchedSheet<'a>>,
    /// Vocabulary ids that no sheet matched
    pub missing_ids: Vec<&'a str>,
}

impl<'a> Classification<'a> {
    /// "No known sheets": the caller must fall back to every sheet.
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    /// Name of the first summary-role sheet, if one was found.
    pub fn ground_truth(&self) -> Option<&'a str> {
        self.matched
            .iter()
            .find(|m| m.entry.role == SheetRole::Summary)
            .map(|m| m.sheet.name.as_str())
    }

    pub fn matched_names(&self) -> Vec<&'a str> {
        self.matched.iter().map(|m| m.sheet.name.as_str()).collect()
    }
}

/// Sheets chosen for the payload after applying the fallback policy.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub sheets: Vec<&'a Sheet>,
    /// True when nothing matched and every sheet was taken
    pub fallback: bool,
}

pub fn classify<'a>(store: &'a SheetStore, vocabulary: &'a SheetVocabulary) -> Classification<'a> {
    let matched: Vec<MatchedSheet<'a>> = store
        .sheets()
        .iter()
        .filter_map(|sheet| {
            vocabulary
                .lookup(&sheet.name)
                .map(|entry| MatchedSheet { sheet, entry })
        })
        .collect();

    let missing_ids = vocabulary
        .entries()
        .iter()
        .filter(|entry| !store.sheets().iter().any(|s| entry.matches(&s.name)))
        .map(|entry| entry.id.as_str())
        .collect();

    Classification {
        matched,
        missing_ids,
    }
}

/// Over-include rather than analyze nothing: no matches means every sheet.
pub fn select<'a>(store: &'a SheetStore, classification: &Classification<'a>) -> Selection<'a> {
    if classification.is_empty() {
        Selection {
            sheets: store.sheets().iter().collect(),
            fallback: true,
        }
    } else {
        Selection {
            sheets: classification.matched.iter().map(|m| m.sheet).collect(),
            fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;

    fn store(names: &[&str]) -> SheetStore {
        names
            .iter()
            .map(|n| Sheet::new(*n, vec![Row::new().with("x", 1.0)]))
            .collect()
    }

    #[test]
    fn exact_vocabulary_names_select_exactly_the_matching_subset() {
        let store = store(&[
            "Cover",
            "AcrossReplicationsSummary",
            "Notes",
            "CounterStatsByRep",
        ]);
        let vocabulary = SheetVocabulary::default();
        let classification = classify(&store, &vocabulary);

        assert_eq!(
            classification.matched_names(),
            vec!["AcrossReplicationsSummary", "CounterStatsByRep"]
        );
        assert_eq!(
            classification.ground_truth(),
            Some("AcrossReplicationsSummary")
        );

        let selection = select(&store, &classification);
        assert!(!selection.fallback);
        assert_eq!(selection.sheets.len(), 2);
    }

    #[test]
    fn no_matches_falls_back_to_all_sheets() {
        let store = store(&["Sheet1", "Sheet2", "Pivot"]);
        let vocabulary = SheetVocabulary::default();
        let classification = classify(&store, &vocabulary);

        assert!(classification.is_empty());
        assert_eq!(classification.missing_ids.len(), vocabulary.entries().len());

        let selection = select(&store, &classification);
        assert!(selection.fallback);
        assert_eq!(selection.sheets.len(), store.len());
    }

    #[test]
    fn containment_works_in_both_directions() {
        let vocabulary = SheetVocabulary::default();
        // sheet name contains the id
        assert!(vocabulary.lookup("AcrossReplicationsSummary (2)").is_some());
        // id contains the sheet name (Excel truncates names to 31 chars)
        assert!(vocabulary.lookup("DiscreteTimeStats").is_some());
        assert!(vocabulary.lookup("acrossreplicationssummary").is_none());
    }

    #[test]
    fn empty_sheet_name_never_matches() {
        let vocabulary = SheetVocabulary::default();
        assert!(vocabulary.lookup("").is_none());
    }

    #[test]
    fn exact_rule_rejects_partial_names() {
        let vocabulary =
            SheetVocabulary::new(vec![VocabularyEntry::new("Queues", SheetRole::ReplicationDetail).exact()]);
        assert!(vocabulary.lookup("Queues").is_some());
        assert!(vocabulary.lookup("QueuesByRep").is_none());
        assert!(vocabulary.lookup("Queue").is_none());
    }

    #[test]
    fn missing_ids_lists_unmatched_entries() {
        let store = store(&["AcrossReplicationsSummary"]);
        let vocabulary = SheetVocabulary::default();
        let classification = classify(&store, &vocabulary);
        assert!(!classification.missing_ids.contains(&"AcrossReplicationsSummary"));
        assert!(classification.missing_ids.contains(&"ProjectInformation"));
        assert_eq!(classification.missing_ids.len(), 5);
    }
}
