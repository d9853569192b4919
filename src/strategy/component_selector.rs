use crate::state::{GepaState, ProgramIdx};

/// The components to rewrite, plus the round-robin counter the child should
/// inherit (`None` means: derive it from the parents on insertion).
#[derive(Debug, Clone)]
pub struct ComponentChoice {
    pub names: Vec<String>,
    pub next_component: Option<usize>,
}

/// Picks which components of the selected parent to rewrite.
///
/// Selection is pure — the round-robin advance is expressed through
/// [`ComponentChoice::next_component`] and applied by the engine when the
/// child is inserted, never by mutating the parent's counter.
#[derive(Debug, Clone, Default)]
pub enum ComponentSelector {
    /// One component per proposal, cycling through the lineage's counter.
    #[default]
    RoundRobin,
    /// Every component at once.
    All,
}

impl ComponentSelector {
    pub fn select(&self, state: &GepaState, parent: ProgramIdx) -> ComponentChoice {
        let names = state.component_names();
        match self {
            Self::RoundRobin => {
                let cursor = state.next_component_for(parent);
                ComponentChoice {
                    names: vec![names[cursor].clone()],
                    next_component: Some((cursor + 1) % names.len()),
                }
            }
            Self::All => ComponentChoice {
                names: names.to_vec(),
                next_component: None,
            },
        }
    }
}
