//! Route-group selection filtering.
//!
//! Selecting a vehicle hides every tracked vehicle outside its group
//! (same headsign and same route short name). Clearing shows everything again.
//!
//! Two callers select vehicles and they disagree on what a second selection
//! means, so the mode is explicit:
//! - [`SelectionMode::Interactive`]: a click while something is selected
//!   clears instead (toggle).
//! - [`SelectionMode::Sequenced`]: the auto-play sequencer replaces the
//!   selection directly, without flashing every vehicle back in between.

use std::fmt::Debug;

use log::debug;

use crate::reconciler::Reconciler;
use crate::surface::MarkerSurface;
use crate::{GroupKey, Vehicle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    Interactive,
    Sequenced,
}

/// Which vehicle, if any, the user is focused on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    selected: Option<Vehicle>,
}

impl SelectionState {
    pub fn selecting(vehicle: Vehicle) -> Self {
        Self { selected: Some(vehicle) }
    }

    pub fn selected(&self) -> Option<&Vehicle> {
        self.selected.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.selected.is_some()
    }

    pub fn group_key(&self) -> Option<GroupKey> {
        self.selected.as_ref().map(Vehicle::group_key)
    }

    /// Whether `vehicle` should be hidden under the current selection.
    pub fn hides(&self, vehicle: &Vehicle) -> bool {
        match &self.selected {
            Some(selected) => !vehicle.in_group(&selected.group_key()),
            None => false,
        }
    }
}

/// Result of a selection request.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionChange {
    Selected(GroupKey),
    Cleared,
}

/// Focus on `vehicle`'s group: hide every other tracked vehicle.
///
/// Returns how many markers changed visibility.
pub fn select<H, S>(
    state: &mut SelectionState,
    tracked: &mut Reconciler<H>,
    surface: &mut S,
    vehicle: &Vehicle,
) -> usize
where
    H: Copy + Debug,
    S: MarkerSurface<Handle = H>,
{
    let group = vehicle.group_key();
    let changed = tracked.apply_visibility(surface, |v| v.in_group(&group));
    debug!(
        "[Selection] Selected {} ({} / {}), {} markers changed",
        vehicle.key(),
        group.short_label,
        group.headsign,
        changed
    );
    state.selected = Some(vehicle.clone());
    changed
}

/// Show every tracked vehicle and forget the selection.
pub fn clear<H, S>(state: &mut SelectionState, tracked: &mut Reconciler<H>, surface: &mut S) -> usize
where
    H: Copy + Debug,
    S: MarkerSurface<Handle = H>,
{
    let changed = tracked.apply_visibility(surface, |_| true);
    if state.selected.take().is_some() {
        debug!("[Selection] Cleared, {} markers shown", changed);
    }
    changed
}

/// Select `vehicle` according to `mode`'s re-entrancy rule.
pub fn request<H, S>(
    state: &mut SelectionState,
    tracked: &mut Reconciler<H>,
    surface: &mut S,
    vehicle: &Vehicle,
    mode: SelectionMode,
) -> SelectionChange
where
    H: Copy + Debug,
    S: MarkerSurface<Handle = H>,
{
    if mode == SelectionMode::Interactive && state.is_active() {
        clear(state, tracked, surface);
        return SelectionChange::Cleared;
    }

    select(state, tracked, surface, vehicle);
    SelectionChange::Selected(vehicle.group_key())
}
