//! Profile table: which command each hardware control triggers
//!
//! A [`ProfileTable`] keeps a forward map (control to command), a reverse
//! map (command to controls) and the display order of rows. All three live
//! under one lock so the two maps never disagree. The dispatcher reads it on
//! every MIDI event; loading, editing and saving write to it.

pub mod watcher;
pub mod xml;

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::commands::{CommandCatalog, UNMAPPED};
use crate::error::{BridgeError, Result};
use crate::midi::{EventKind, MidiEvent, CHANNELS};

pub use watcher::ProfileWatcher;

/// Message kind part of a [`ControlId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKind {
    ControlChange,
    Note,
    PitchBend,
}

/// Identity of a physical control
///
/// Ordered by kind, then number, then channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId {
    pub channel: u8,
    pub number: u16,
    pub kind: ControlKind,
}

impl ControlId {
    pub fn control_change(channel: u8, number: u16) -> Self {
        Self {
            channel,
            number,
            kind: ControlKind::ControlChange,
        }
    }

    pub fn note(channel: u8, number: u16) -> Self {
        Self {
            channel,
            number,
            kind: ControlKind::Note,
        }
    }

    /// Pitch bend has one control per channel, always number 0
    pub fn pitch_bend(channel: u8) -> Self {
        Self {
            channel,
            number: 0,
            kind: ControlKind::PitchBend,
        }
    }
}

impl From<&MidiEvent> for ControlId {
    fn from(event: &MidiEvent) -> Self {
        match event.kind {
            EventKind::ControlChange => Self::control_change(event.channel, event.number),
            EventKind::NoteOn => Self::note(event.channel, event.number),
            EventKind::PitchBend => Self::pitch_bend(event.channel),
        }
    }
}

impl Ord for ControlId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then(self.number.cmp(&other.number))
            .then(self.channel.cmp(&other.channel))
    }
}

impl PartialOrd for ControlId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ControlKind::ControlChange => write!(f, "CC {} ch:{}", self.number, self.channel + 1),
            ControlKind::Note => write!(f, "Note {} ch:{}", self.number, self.channel + 1),
            ControlKind::PitchBend => write!(f, "PitchBend ch:{}", self.channel + 1),
        }
    }
}

/// One row of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub control: ControlId,
    pub command: String,
}

impl Binding {
    pub fn new(control: ControlId, command: impl Into<String>) -> Self {
        Self {
            control,
            command: command.into(),
        }
    }
}

/// Display ordering criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Natural control order
    #[default]
    Control,
    /// Position of the bound command in the catalog
    Command,
}

#[derive(Debug, Default)]
struct Inner {
    forward: HashMap<ControlId, String>,
    reverse: HashMap<String, BTreeSet<ControlId>>,
    rows: Vec<ControlId>,
    sort_key: SortKey,
    ascending: bool,
    unsaved: bool,
    saved: HashMap<ControlId, String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            ascending: true,
            ..Default::default()
        }
    }

    /// Insert or overwrite; `command` is already validated
    fn insert(&mut self, control: ControlId, command: String) {
        if let Some(old) = self.forward.insert(control, command.clone()) {
            self.remove_reverse(&old, &control);
        } else {
            self.rows.push(control);
        }
        self.reverse.entry(command).or_default().insert(control);
    }

    fn remove(&mut self, control: &ControlId) -> bool {
        match self.forward.remove(control) {
            Some(old) => {
                self.remove_reverse(&old, control);
                self.rows.retain(|c| c != control);
                true
            }
            None => false,
        }
    }

    fn remove_reverse(&mut self, command: &str, control: &ControlId) {
        if let Some(set) = self.reverse.get_mut(command) {
            set.remove(control);
            if set.is_empty() {
                self.reverse.remove(command);
            }
        }
    }

    fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.rows.clear();
    }

    fn sort(&mut self, catalog: &CommandCatalog) {
        self.rows.sort();
        if !self.ascending {
            self.rows.reverse();
        }
        if self.sort_key == SortKey::Command {
            let forward = &self.forward;
            let index = |c: &ControlId| {
                forward
                    .get(c)
                    .and_then(|name| catalog.index_of(name))
                    .unwrap_or(0)
            };
            // stable, so equal commands keep control order
            if self.ascending {
                self.rows.sort_by_key(index);
            } else {
                self.rows.sort_by(|a, b| index(b).cmp(&index(a)));
            }
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        self.rows
            .iter()
            .filter_map(|c| self.forward.get(c).map(|cmd| Binding::new(*c, cmd.clone())))
            .collect()
    }
}

fn check_channel(control: &ControlId) -> Result<()> {
    if control.channel as usize >= CHANNELS {
        return Err(BridgeError::ChannelOutOfRange(control.channel));
    }
    Ok(())
}

/// Thread-safe control/command mapping
pub struct ProfileTable {
    catalog: Arc<CommandCatalog>,
    inner: RwLock<Inner>,
}

impl ProfileTable {
    /// Create an empty table validating against `catalog`
    pub fn new(catalog: Arc<CommandCatalog>) -> Self {
        Self {
            catalog,
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    fn validated(&self, command: &str) -> String {
        if self.catalog.contains(command) {
            command.to_string()
        } else {
            debug!("Unknown command '{}' bound as {}", command, UNMAPPED);
            UNMAPPED.to_string()
        }
    }

    /// Bind `control` to `command`, replacing any previous binding
    ///
    /// Commands missing from the catalog are stored as [`UNMAPPED`]. Channels
    /// past 15 are refused with [`BridgeError::ChannelOutOfRange`].
    pub fn bind(&self, control: ControlId, command: &str) -> Result<()> {
        check_channel(&control)?;
        let command = self.validated(command);
        let mut inner = self.inner.write();
        inner.insert(control, command);
        inner.sort(&self.catalog);
        inner.unsaved = true;
        Ok(())
    }

    /// Add a row with no command yet
    pub fn bind_unmapped(&self, control: ControlId) -> Result<()> {
        check_channel(&control)?;
        let mut inner = self.inner.write();
        inner.insert(control, UNMAPPED.to_string());
        inner.sort(&self.catalog);
        inner.unsaved = true;
        Ok(())
    }

    /// Remove a binding; absent controls are ignored
    pub fn unbind(&self, control: &ControlId) {
        let mut inner = self.inner.write();
        inner.remove(control);
        inner.unsaved = true;
    }

    /// Remove the binding shown at display row `index`
    pub fn unbind_row(&self, index: usize) -> Result<()> {
        let mut inner = self.inner.write();
        let len = inner.rows.len();
        let control = *inner
            .rows
            .get(index)
            .ok_or(BridgeError::IndexOutOfRange { index, len })?;
        inner.remove(&control);
        inner.unsaved = true;
        Ok(())
    }

    /// Command bound to `control`
    pub fn lookup(&self, control: &ControlId) -> Option<String> {
        self.inner.read().forward.get(control).cloned()
    }

    /// Controls bound to `command`
    pub fn commands_for(&self, command: &str) -> Vec<ControlId> {
        self.inner
            .read()
            .reverse
            .get(command)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Is any control bound to `command`?
    pub fn command_has_binding(&self, command: &str) -> bool {
        self.inner.read().reverse.contains_key(command)
    }

    pub fn exists(&self, control: &ControlId) -> bool {
        self.inner.read().forward.contains_key(control)
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }

    /// Binding shown at display row `index`
    pub fn row(&self, index: usize) -> Option<Binding> {
        let inner = self.inner.read();
        let control = *inner.rows.get(index)?;
        let command = inner.forward.get(&control)?.clone();
        Some(Binding { control, command })
    }

    /// Display row of `control`
    pub fn row_for(&self, control: &ControlId) -> Option<usize> {
        self.inner.read().rows.iter().position(|c| c == control)
    }

    /// All bindings in display order
    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.read().bindings()
    }

    /// Change the display order
    pub fn reorder(&self, key: SortKey, ascending: bool) {
        let mut inner = self.inner.write();
        inner.sort_key = key;
        inner.ascending = ascending;
        inner.sort(&self.catalog);
    }

    /// Current display order criterion
    pub fn sort_order(&self) -> (SortKey, bool) {
        let inner = self.inner.read();
        (inner.sort_key, inner.ascending)
    }

    /// Clear and rebuild from `bindings`; the result counts as saved
    pub fn replace_all<I>(&self, bindings: I)
    where
        I: IntoIterator<Item = Binding>,
    {
        let validated: Vec<(ControlId, String)> = bindings
            .into_iter()
            .filter(|b| match check_channel(&b.control) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Skipping {} -> {}: {}", b.control, b.command, e);
                    false
                }
            })
            .map(|b| (b.control, self.validated(&b.command)))
            .collect();

        let mut inner = self.inner.write();
        inner.clear();
        for (control, command) in validated {
            inner.insert(control, command);
        }
        inner.sort(&self.catalog);
        inner.saved = inner.forward.clone();
        inner.unsaved = false;
    }

    /// Serialize the table; `None` when there is nothing to write
    pub fn export(&self) -> Result<Option<String>> {
        let inner = self.inner.read();
        if inner.forward.is_empty() {
            return Ok(None);
        }
        xml::write_bindings(&inner.bindings()).map(Some)
    }

    /// Replace the table with the bindings in an XML document
    ///
    /// Unrecognized entries are skipped. Returns the number of rows loaded.
    pub fn import(&self, document: &str) -> usize {
        let bindings = xml::parse_bindings(document);
        let count = bindings.len();
        self.replace_all(bindings);
        count
    }

    /// Edited since the last load or save, non-empty, and actually different
    ///
    /// Reverting an edit or emptying the table does not count as unsaved work.
    pub fn is_unsaved(&self) -> bool {
        let inner = self.inner.read();
        inner.unsaved && !inner.rows.is_empty() && inner.forward != inner.saved
    }

    /// Does the table differ from what was last loaded or saved?
    pub fn has_changes(&self) -> bool {
        let inner = self.inner.read();
        inner.forward != inner.saved
    }

    /// Write the table to `path`
    ///
    /// An empty table writes nothing. On failure the error is logged for the
    /// user and returned; the table stays marked unsaved.
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read();
            if inner.forward.is_empty() {
                debug!("Profile empty, not saving");
                return Ok(());
            }
            (xml::write_bindings(&inner.bindings())?, inner.forward.clone())
        };
        let (document, forward) = snapshot;

        if let Err(source) = tokio::fs::write(path, document).await {
            error!(
                "Unable to save profile to {}. Try again, or save to a different location: {}",
                path.display(),
                source
            );
            return Err(BridgeError::ProfileWrite {
                path: path.to_path_buf(),
                source,
            });
        }

        let mut inner = self.inner.write();
        if inner.forward == forward {
            inner.unsaved = false;
        }
        inner.saved = forward;
        info!("Profile saved to {}", path.display());
        Ok(())
    }

    /// Load the table from `path`, replacing its contents
    pub async fn load_from_file(&self, path: &Path) -> Result<usize> {
        let document = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BridgeError::ProfileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let count = self.import(&document);
        info!("Loaded {} bindings from {}", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> ProfileTable {
        ProfileTable::new(Arc::new(CommandCatalog::default()))
    }

    /// Forward and reverse maps describe the same pairs
    fn assert_consistent(table: &ProfileTable) {
        let inner = table.inner.read();
        for (control, command) in &inner.forward {
            assert!(inner.reverse.get(command).is_some_and(|s| s.contains(control)));
        }
        for (command, controls) in &inner.reverse {
            assert!(!controls.is_empty());
            for control in controls {
                assert_eq!(inner.forward.get(control), Some(command));
            }
        }
        assert_eq!(inner.rows.len(), inner.forward.len());
    }

    #[test]
    fn test_bind_then_lookup() {
        let t = table();
        let slider = ControlId::control_change(0, 7);
        t.bind(slider, "ChangeCurrentSlider").unwrap();
        assert_eq!(t.lookup(&slider).as_deref(), Some("ChangeCurrentSlider"));
        assert!(t.exists(&slider));
        assert!(t.is_unsaved());

        t.unbind(&slider);
        assert_eq!(t.lookup(&slider), None);
        assert!(!t.command_has_binding("ChangeCurrentSlider"));
    }

    #[test]
    fn test_unknown_command_binds_unmapped() {
        let t = table();
        let id = ControlId::note(1, 40);
        t.bind(id, "NotACommand").unwrap();
        assert_eq!(t.lookup(&id).as_deref(), Some(UNMAPPED));
    }

    #[test]
    fn test_rebind_moves_reverse_entry() {
        let t = table();
        let id = ControlId::control_change(0, 1);
        t.bind(id, "Exposure").unwrap();
        t.bind(id, "Contrast").unwrap();
        assert!(t.commands_for("Exposure").is_empty());
        assert_eq!(t.commands_for("Contrast"), vec![id]);
        assert_eq!(t.len(), 1);
        assert_consistent(&t);
    }

    #[test]
    fn test_unbind_row_out_of_range() {
        let t = table();
        t.bind_unmapped(ControlId::pitch_bend(0)).unwrap();
        assert!(matches!(
            t.unbind_row(1),
            Err(BridgeError::IndexOutOfRange { index: 1, len: 1 })
        ));
        t.unbind_row(0).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_natural_order_is_kind_number_channel() {
        let t = table();
        t.bind(ControlId::pitch_bend(0), "Exposure").unwrap();
        t.bind(ControlId::note(0, 1), "Exposure").unwrap();
        t.bind(ControlId::control_change(3, 5), "Exposure").unwrap();
        t.bind(ControlId::control_change(1, 5), "Exposure").unwrap();
        t.bind(ControlId::control_change(9, 2), "Exposure").unwrap();
        let rows: Vec<_> = t.bindings().into_iter().map(|b| b.control).collect();
        assert_eq!(
            rows,
            vec![
                ControlId::control_change(9, 2),
                ControlId::control_change(1, 5),
                ControlId::control_change(3, 5),
                ControlId::note(0, 1),
                ControlId::pitch_bend(0),
            ]
        );
        assert_eq!(t.row_for(&ControlId::note(0, 1)), Some(3));

        t.reorder(SortKey::Control, false);
        assert_eq!(t.row(0).unwrap().control, ControlId::pitch_bend(0));
    }

    #[test]
    fn test_sort_by_command_catalog_index() {
        let catalog = Arc::new(CommandCatalog::new(["Zeta", "Alpha"]));
        let t = ProfileTable::new(catalog);
        t.bind(ControlId::control_change(0, 1), "Alpha").unwrap();
        t.bind(ControlId::control_change(0, 2), "Zeta").unwrap();
        t.bind(ControlId::control_change(0, 3), "Alpha").unwrap();
        t.reorder(SortKey::Command, true);
        let commands: Vec<_> = t.bindings().into_iter().map(|b| b.command).collect();
        assert_eq!(commands, vec!["Zeta", "Alpha", "Alpha"]);
        // ties keep control order
        assert_eq!(t.row(1).unwrap().control, ControlId::control_change(0, 1));

        t.reorder(SortKey::Command, false);
        assert_eq!(t.row(0).unwrap().command, "Alpha");
        assert_eq!(t.row(0).unwrap().control, ControlId::control_change(0, 3));
        assert_eq!(t.sort_order(), (SortKey::Command, false));
    }

    #[test]
    fn test_replace_all_clears_dirty_state() {
        let t = table();
        t.bind(ControlId::note(0, 1), "Pick").unwrap();
        t.replace_all(vec![Binding::new(ControlId::note(0, 2), "Reject")]);
        assert!(!t.is_unsaved());
        assert!(!t.has_changes());
        assert!(!t.exists(&ControlId::note(0, 1)));
        assert!(t.command_has_binding("Reject"));
    }

    #[test]
    fn test_reverted_edit_is_not_unsaved() {
        let t = table();
        let id = ControlId::note(0, 1);
        t.replace_all(vec![Binding::new(id, "Pick")]);
        t.bind(id, "Reject").unwrap();
        assert!(t.is_unsaved());
        t.bind(id, "Pick").unwrap();
        assert!(!t.is_unsaved());
        assert!(!t.has_changes());
    }

    #[test]
    fn test_emptied_table_is_not_unsaved() {
        let t = table();
        let id = ControlId::note(0, 1);
        t.bind(id, "Pick").unwrap();
        assert!(t.is_unsaved());
        t.unbind(&id);
        assert!(!t.is_unsaved());
    }

    #[test]
    fn test_channel_out_of_range_is_refused() {
        let t = table();
        assert!(matches!(
            t.bind(ControlId::control_change(20, 7), "Exposure"),
            Err(BridgeError::ChannelOutOfRange(20))
        ));
        assert!(t.bind_unmapped(ControlId::note(16, 1)).is_err());
        assert!(t.is_empty());

        t.replace_all(vec![
            Binding::new(ControlId::control_change(20, 7), "Exposure"),
            Binding::new(ControlId::control_change(15, 7), "Contrast"),
        ]);
        assert_eq!(t.len(), 1);

        // whatever the table holds survives export and import
        let copy = table();
        copy.replace_all(xml::parse_bindings(&t.export().unwrap().unwrap()));
        assert_eq!(copy.bindings(), t.bindings());
    }

    #[test]
    fn test_export_empty_table_is_none() {
        assert!(table().export().unwrap().is_none());
    }

    #[test]
    fn test_export_import_round_trip() {
        let t = table();
        t.bind(ControlId::control_change(0, 7), "ChangeCurrentSlider").unwrap();
        t.bind(ControlId::control_change(4, 300), "Exposure").unwrap();
        t.bind(ControlId::note(2, 36), "Pick").unwrap();
        t.bind(ControlId::pitch_bend(15), "Contrast").unwrap();
        let document = t.export().unwrap().unwrap();

        let copy = table();
        copy.replace_all(xml::parse_bindings(&document));
        let mut a = t.bindings();
        let mut b = copy.bindings();
        a.sort_by_key(|x| x.control);
        b.sort_by_key(|x| x.control);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.xml");

        let t = table();
        t.bind(ControlId::note(0, 60), "Undo").unwrap();
        t.save_to_file(&path).await.unwrap();
        assert!(!t.is_unsaved());
        assert!(!t.has_changes());

        let loaded = table();
        assert_eq!(loaded.load_from_file(&path).await.unwrap(), 1);
        assert_eq!(loaded.lookup(&ControlId::note(0, 60)).as_deref(), Some("Undo"));
    }

    #[tokio::test]
    async fn test_save_failure_keeps_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("profile.xml");

        let t = table();
        t.bind(ControlId::note(0, 60), "Undo").unwrap();
        let err = t.save_to_file(&path).await.unwrap_err();
        assert!(matches!(err, BridgeError::ProfileWrite { .. }));
        assert!(t.is_unsaved());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Bind(ControlId, usize),
        Unbind(ControlId),
        Replace(Vec<(ControlId, usize)>),
    }

    fn control_id() -> impl Strategy<Value = ControlId> {
        (0u8..4, 0u16..6, 0u8..3).prop_map(|(channel, number, kind)| match kind {
            0 => ControlId::control_change(channel, number),
            1 => ControlId::note(channel, number),
            _ => ControlId::pitch_bend(channel),
        })
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (control_id(), 0usize..8).prop_map(|(c, i)| Op::Bind(c, i)),
            2 => control_id().prop_map(Op::Unbind),
            1 => prop::collection::vec((control_id(), 0usize..8), 0..6).prop_map(Op::Replace),
        ]
    }

    proptest! {
        #[test]
        fn prop_indices_stay_consistent(ops in prop::collection::vec(op(), 0..40)) {
            let t = table();
            let names = ["Exposure", "Contrast", "Pick", "Undo", "NotInCatalog", "Redo", "Next", "Prev"];
            for op in ops {
                match op {
                    Op::Bind(c, i) => t.bind(c, names[i]).unwrap(),
                    Op::Unbind(c) => t.unbind(&c),
                    Op::Replace(list) => t.replace_all(
                        list.into_iter().map(|(c, i)| Binding::new(c, names[i])),
                    ),
                }
                assert_consistent(&t);
            }
        }
    }
}
