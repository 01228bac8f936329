//! Host command catalog
//!
//! The catalog is the ordered list of command names the host understands.
//! Index 0 is always [`UNMAPPED`]. Repeat commands are the dual-direction
//! entries that turn a relative movement into one of two host commands.

use std::collections::HashMap;

/// Placeholder for a control with no command yet
pub const UNMAPPED: &str = "Unmapped";
/// Switch to the previous profile (handled outside the dispatcher)
pub const PREVIOUS_PROFILE: &str = "PrevPro";
/// Switch to the next profile (handled outside the dispatcher)
pub const NEXT_PROFILE: &str = "NextPro";
/// Ask the host to resend all control values
pub const FULL_REFRESH: &str = "FullRefresh 1\n";

/// Clockwise/counter-clockwise command lines for a repeat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatCommand {
    pub cw: &'static str,
    pub ccw: &'static str,
}

const REPEAT_COMMANDS: &[(&str, &str, &str)] = &[
    ("ChangeBrushSize", "BrushSizeLarger 1\n", "BrushSizeSmaller 1\n"),
    ("ChangeCurrentSlider", "SliderIncrease 1\n", "SliderDecrease 1\n"),
    ("ChangeFeatherSize", "BrushFeatherLarger 1\n", "BrushFeatherSmaller 1\n"),
    (
        "ChangeLastDevelopParameter",
        "IncrementLastDevelopParameter 1\n",
        "DecrementLastDevelopParameter 1\n",
    ),
    ("Key32Key31", "Key32 1\n", "Key31 1\n"),
    ("Key34Key33", "Key34 1\n", "Key33 1\n"),
    ("Key36Key35", "Key36 1\n", "Key35 1\n"),
    ("Key38Key37", "Key38 1\n", "Key37 1\n"),
    ("Key40Key39", "Key40 1\n", "Key39 1\n"),
    ("NextPrev", "Next 1\n", "Prev 1\n"),
    ("RedoUndo", "Redo 1\n", "Undo 1\n"),
    ("SelectRightLeft", "Select1Right 1\n", "Select1Left 1\n"),
    ("ZoomInOut", "ZoomInSmallStep 1\n", "ZoomOutSmallStep 1\n"),
    ("ZoomOutIn", "ZoomOutSmallStep 1\n", "ZoomInSmallStep 1\n"),
];

/// Commands the host accepts with an absolute value
const VALUE_COMMANDS: &[&str] = &[
    "Exposure",
    "Contrast",
    "Highlights",
    "Shadows",
    "Whites",
    "Blacks",
    "Clarity",
    "Dehaze",
    "Vibrance",
    "Saturation",
    "Temperature",
    "Tint",
    "Texture",
    "Undo",
    "Redo",
    "Pick",
    "Reject",
    "SetRating0",
    "SetRating1",
    "SetRating2",
    "SetRating3",
    "SetRating4",
    "SetRating5",
    "Next",
    "Prev",
    "ResetAll",
    "FullRefresh",
];

/// Ordered command names plus the repeat table
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    names: Vec<String>,
    index: HashMap<String, usize>,
    repeats: HashMap<String, RepeatCommand>,
}

impl CommandCatalog {
    /// Build a catalog from `names`; [`UNMAPPED`] is forced to index 0
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self {
            names: Vec::new(),
            index: HashMap::new(),
            repeats: REPEAT_COMMANDS
                .iter()
                .map(|&(name, cw, ccw)| (name.to_string(), RepeatCommand { cw, ccw }))
                .collect(),
        };
        catalog.push(UNMAPPED.to_string());
        for name in names {
            catalog.push(name.into());
        }
        catalog
    }

    fn push(&mut self, name: String) {
        if !self.index.contains_key(&name) {
            self.index.insert(name.clone(), self.names.len());
            self.names.push(name);
        }
    }

    /// Position of `name` in the catalog
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Repeat entry for a dual-direction command
    pub fn repeat(&self, name: &str) -> Option<&RepeatCommand> {
        self.repeats.get(name)
    }
}

impl Default for CommandCatalog {
    /// Built-in catalog: navigation, repeat commands, then value commands
    fn default() -> Self {
        let names = [PREVIOUS_PROFILE, NEXT_PROFILE]
            .into_iter()
            .chain(REPEAT_COMMANDS.iter().map(|&(name, _, _)| name))
            .chain(VALUE_COMMANDS.iter().copied());
        Self::new(names)
    }
}

/// Is this command consumed by the profile switcher rather than the host?
pub fn is_local_command(name: &str) -> bool {
    matches!(name, PREVIOUS_PROFILE | NEXT_PROFILE | UNMAPPED)
}
