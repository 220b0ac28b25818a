use super::types::ReactionType;

/// Open/closed state of a post's reaction picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionPicker {
    open: bool,
}

impl ReactionPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Closes the picker and hands back the chosen type to toggle.
    ///
    /// The picker closes before any remote work starts, whatever the outcome.
    pub fn select(&mut self, reaction_type: ReactionType) -> ReactionType {
        self.close();
        reaction_type
    }
}
