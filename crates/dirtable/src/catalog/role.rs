// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::{RESERVED_PREFIX, RoleRow};
use crate::error::{Result, duplicate_object, insufficient_privilege, reserved_name, undefined_object};
use crate::session::Session;
use diagnostics::log_info;
use fileam::Oid;

impl Session {
    pub fn create_role(&self, name: &str, superuser: bool) -> Result<Oid> {
        let user = self.current_user();
        if !self.catalog.read(|data| data.is_superuser(user)) {
            return Err(insufficient_privilege("permission denied to create role"));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(reserved_name(format!("role name \"{name}\" is reserved")));
        }

        let oid = self.catalog.modify(|data| -> Result<Oid> {
            if data.role_by_name(name).is_some() {
                return Err(duplicate_object(format!("role \"{name}\" already exists")));
            }
            let oid = data.new_oid();
            let _ = data.roles.insert(
                oid,
                RoleRow {
                    oid,
                    name: name.to_string(),
                    superuser,
                },
            );
            Ok(oid)
        })?;
        self.catalog.command_counter_increment();
        log_info!("Created role {name}", name: name.to_string());
        Ok(oid)
    }

    pub fn role_oid(&self, name: &str) -> Result<Oid> {
        self.catalog
            .read(|data| data.role_by_name(name).map(|role| role.oid))
            .ok_or_else(|| undefined_object(format!("role \"{name}\" does not exist")))
    }

    /// Run later commands as `name`. Connections made for the previous role
    /// are dropped since its user mappings no longer apply.
    pub fn set_session_user(&self, name: &str) -> Result<()> {
        let oid = self.role_oid(name)?;
        self.catalog.set_current_user(oid);
        self.connections.invalidate_user_mapping(None);
        Ok(())
    }

    #[must_use]
    pub fn current_user_name(&self) -> String {
        let user = self.current_user();
        self.catalog.read(|data| data.role_name(user))
    }
}
