//! Explicit active-key state with pure bitmask diffing.

use std::collections::HashSet;

use crate::buttons::Button;

/// The minimal press/release events needed to move from one active set to
/// the next. Releases always precede presses so a key reassigned across
/// overlapping bit positions never ends up transiently double-pressed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyTransition {
    pub releases: Vec<Button>,
    pub presses: Vec<Button>,
}

impl KeyTransition {
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty() && self.presses.is_empty()
    }
}

/// The set of buttons currently held down on the target.
#[derive(Debug, Clone, Default)]
pub struct ActiveKeys {
    held: HashSet<Button>,
}

impl ActiveKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the transition to `mask` without applying it. Bits outside
    /// the button table are ignored.
    pub fn diff(&self, mask: u32) -> KeyTransition {
        let mut transition = KeyTransition::default();
        for button in Button::ALL {
            let wanted = button.is_set(mask);
            let held = self.held.contains(&button);
            if held && !wanted {
                transition.releases.push(button);
            } else if !held && wanted {
                transition.presses.push(button);
            }
        }
        transition
    }

    pub fn press(&mut self, button: Button) {
        self.held.insert(button);
    }

    pub fn release(&mut self, button: Button) {
        self.held.remove(&button);
    }

    /// Remove and return every held button, in bit order.
    pub fn drain(&mut self) -> Vec<Button> {
        let held: Vec<Button> = Button::ALL
            .into_iter()
            .filter(|b| self.held.contains(b))
            .collect();
        self.held.clear();
        held
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn contains(&self, button: Button) -> bool {
        self.held.contains(&button)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }
}
