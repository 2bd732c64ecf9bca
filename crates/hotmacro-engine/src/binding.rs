//! Role-scoped hotkey bindings.
//!
//! Tracks which canonical combo is registered for each [`HotkeyRole`] and
//! owns re-registration when a role's combo changes. Each role has at most
//! one live handle; a combo can only be owned by one role at a time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use hotmacro_core::error::{HotmacroError, Result};
use hotmacro_core::types::HotkeyRole;

use crate::combo::KeyCombo;
use crate::hotkey::{HotkeyCallback, HotkeyHandle, HotkeyService};

/// Roles removed by [`BindingTable::unbind_all`]. Activate survives a stop.
const RUN_ROLES: [HotkeyRole; 2] = [HotkeyRole::Trigger, HotkeyRole::Stop];

#[derive(Debug, Clone)]
struct Binding {
    combo: KeyCombo,
    handle: HotkeyHandle,
}

/// Registered hotkeys keyed by role.
///
/// Not internally synchronized; the engine keeps it behind its own lock.
pub struct BindingTable {
    service: Arc<dyn HotkeyService>,
    bindings: HashMap<HotkeyRole, Binding>,
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTable")
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl BindingTable {
    pub fn new(service: Arc<dyn HotkeyService>) -> Self {
        Self {
            service,
            bindings: HashMap::new(),
        }
    }

    /// Bind `combo` to `role`, replacing the role's previous binding.
    ///
    /// The old handle is removed before the new one is registered, so there is
    /// never a moment with two live bindings for the same role. If the new
    /// registration fails the role is left unbound.
    pub fn bind(
        &mut self,
        role: HotkeyRole,
        combo: &KeyCombo,
        callback: HotkeyCallback,
    ) -> Result<HotkeyHandle> {
        if let Some((owner, _)) = self
            .bindings
            .iter()
            .find(|(r, b)| **r != role && b.combo == *combo)
        {
            return Err(HotmacroError::AlreadyBound {
                combo: combo.to_string(),
                role: *owner,
            });
        }

        self.unbind(role);

        match self.service.register(combo, true, callback) {
            Ok(handle) => {
                info!(role = %role, combo = %combo, handle = %handle, "Hotkey bound");
                self.bindings.insert(
                    role,
                    Binding {
                        combo: combo.clone(),
                        handle,
                    },
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(role = %role, combo = %combo, error = %e, "Hotkey registration failed");
                Err(e)
            }
        }
    }

    /// Remove the role's binding if present.
    ///
    /// A failure to unregister is logged and swallowed: the hook may already
    /// have been invalidated outside the engine.
    pub fn unbind(&mut self, role: HotkeyRole) {
        let Some(binding) = self.bindings.remove(&role) else {
            return;
        };
        match self.service.unregister(binding.handle) {
            Ok(()) => debug!(role = %role, combo = %binding.combo, "Hotkey unbound"),
            Err(e) => warn!(
                role = %role,
                combo = %binding.combo,
                error = %e,
                "Stale hotkey handle could not be unregistered"
            ),
        }
    }

    /// Remove the Trigger and Stop bindings, keeping Activate.
    pub fn unbind_all(&mut self) {
        for role in RUN_ROLES {
            self.unbind(role);
        }
    }

    pub fn is_bound(&self, role: HotkeyRole) -> bool {
        self.bindings.contains_key(&role)
    }

    /// The combo currently bound to `role`.
    pub fn combo(&self, role: HotkeyRole) -> Option<&KeyCombo> {
        self.bindings.get(&role).map(|b| &b.combo)
    }

    pub fn bound_roles(&self) -> Vec<HotkeyRole> {
        let mut roles: Vec<HotkeyRole> = self.bindings.keys().copied().collect();
        roles.sort_by_key(|r| *r as u8);
        roles
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHotkeyService;

    fn noop() -> HotkeyCallback {
        Arc::new(|| {})
    }

    fn combo(raw: &str) -> KeyCombo {
        KeyCombo::parse(raw).unwrap()
    }

    fn table() -> (Arc<MockHotkeyService>, BindingTable) {
        let service = Arc::new(MockHotkeyService::new());
        let table = BindingTable::new(Arc::clone(&service) as Arc<dyn HotkeyService>);
        (service, table)
    }

    #[test]
    fn test_bind_registers_with_suppression() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Trigger, &combo("f2"), noop()).unwrap();

        assert!(table.is_bound(HotkeyRole::Trigger));
        assert_eq!(table.combo(HotkeyRole::Trigger).unwrap().as_str(), "f2");
        assert_eq!(service.active_combos(), vec!["f2".to_string()]);
        assert!(service.is_suppressed("f2"));
    }

    #[test]
    fn test_rebind_replaces_previous_handle() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Activate, &combo("f12"), noop()).unwrap();
        table.bind(HotkeyRole::Activate, &combo("f11"), noop()).unwrap();

        assert_eq!(service.active_combos(), vec!["f11".to_string()]);
        assert_eq!(table.combo(HotkeyRole::Activate).unwrap().as_str(), "f11");
    }

    #[test]
    fn test_combo_owned_by_other_role_is_rejected() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Stop, &combo("esc"), noop()).unwrap();

        let err = table
            .bind(HotkeyRole::Trigger, &combo("ESC"), noop())
            .unwrap_err();
        match err {
            HotmacroError::AlreadyBound { combo, role } => {
                assert_eq!(combo, "esc");
                assert_eq!(role, HotkeyRole::Stop);
            }
            other => panic!("Expected AlreadyBound, got {:?}", other),
        }
        assert!(!table.is_bound(HotkeyRole::Trigger));
        assert_eq!(service.active_count(), 1);
    }

    #[test]
    fn test_same_role_may_rebind_same_combo() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Trigger, &combo("f2"), noop()).unwrap();
        table.bind(HotkeyRole::Trigger, &combo("f2"), noop()).unwrap();
        assert_eq!(service.active_count(), 1);
    }

    #[test]
    fn test_hook_conflict_leaves_role_unbound() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Trigger, &combo("f2"), noop()).unwrap();
        service.reject("f3");

        let err = table
            .bind(HotkeyRole::Trigger, &combo("f3"), noop())
            .unwrap_err();
        assert!(matches!(err, HotmacroError::HookConflict { .. }));
        assert!(!table.is_bound(HotkeyRole::Trigger));
        assert_eq!(service.active_count(), 0);
    }

    #[test]
    fn test_stale_handle_does_not_block_rebind() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Activate, &combo("f12"), noop()).unwrap();
        service.invalidate_all();

        table.bind(HotkeyRole::Activate, &combo("f12"), noop()).unwrap();
        assert!(table.is_bound(HotkeyRole::Activate));
        assert_eq!(service.active_combos(), vec!["f12".to_string()]);
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let (service, mut table) = table();
        table.unbind(HotkeyRole::Stop);
        table.bind(HotkeyRole::Stop, &combo("esc"), noop()).unwrap();
        table.unbind(HotkeyRole::Stop);
        table.unbind(HotkeyRole::Stop);
        assert!(!table.is_bound(HotkeyRole::Stop));
        assert_eq!(service.active_count(), 0);
    }

    #[test]
    fn test_unbind_all_keeps_activate() {
        let (service, mut table) = table();
        table.bind(HotkeyRole::Activate, &combo("f12"), noop()).unwrap();
        table.bind(HotkeyRole::Trigger, &combo("f2"), noop()).unwrap();
        table.bind(HotkeyRole::Stop, &combo("esc"), noop()).unwrap();
        assert_eq!(
            table.bound_roles(),
            vec![HotkeyRole::Activate, HotkeyRole::Trigger, HotkeyRole::Stop]
        );

        table.unbind_all();
        assert_eq!(table.bound_roles(), vec![HotkeyRole::Activate]);
        assert_eq!(service.active_combos(), vec!["f12".to_string()]);
    }
}
