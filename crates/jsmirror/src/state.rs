/// Where a variable node is in its lifecycle for the current suspension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Nothing requested yet. Compound values stay here until expanded.
    #[default]
    Unresolved,
    /// One lookup is outstanding for this node.
    Pending,
    Resolved,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    /// An expansion started.
    Expand,
    /// The node's own payload was applied and produced a scalar value.
    Filled,
    /// The batch lookup for the node's properties completed.
    Replied,
    /// A batch, transport or dispatch failure.
    Failed,
}

impl Resolution {
    /// Resolved and Failed are final for the suspension.
    pub fn is_terminal(self) -> bool {
        matches!(self, Resolution::Resolved | Resolution::Failed)
    }

    /// Returns the next state, or `None` if the event does not apply.
    pub(crate) fn on(self, event: Event) -> Option<Resolution> {
        use Resolution::*;

        match (self, event) {
            (Unresolved, Event::Expand) => Some(Pending),
            (Unresolved | Pending, Event::Filled) => Some(Resolved),
            (Pending, Event::Replied) => Some(Resolved),
            (Unresolved | Pending, Event::Failed) => Some(Failed),
            _ => None,
        }
    }
}
