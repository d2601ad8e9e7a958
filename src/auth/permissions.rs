/*!
 * # Permissions Module
 *
 * Permission codenames are `resource:action` strings. They are seeded into the
 * `permissions` table and carried in access tokens.
 */

use lazy_static::lazy_static;

/// Seed definition for a row of the `permissions` table
#[derive(Debug, Clone)]
pub struct PermissionDefinition {
    pub codename: String,
    pub name: String,
    pub app_label: String,
    pub model: String,
}

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const CREATE: &'static str = "create";
    pub const UPDATE: &'static str = "update";
    pub const DELETE: &'static str = "delete";
    pub const MANAGE: &'static str = "manage";
    pub const CHAT: &'static str = "chat";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const SERVICE_ORDERS: &'static str = "service_orders";
    pub const USERS: &'static str = "users";
    pub const PERMISSIONS: &'static str = "permissions";
    pub const ASSISTANT: &'static str = "assistant";
}

/// Common permission string constants for compile-time safety
pub mod consts {
    // Service orders
    pub const SERVICE_ORDERS_READ: &str = "service_orders:read";
    pub const SERVICE_ORDERS_CREATE: &str = "service_orders:create";
    pub const SERVICE_ORDERS_UPDATE: &str = "service_orders:update";
    pub const SERVICE_ORDERS_DELETE: &str = "service_orders:delete";
    pub const SERVICE_ORDERS_MANAGE: &str = "service_orders:manage";

    // Users
    pub const USERS_READ: &str = "users:read";
    pub const USERS_MANAGE: &str = "users:manage";

    pub const PERMISSIONS_READ: &str = "permissions:read";

    pub const ASSISTANT_CHAT: &str = "assistant:chat";
}

/// Name of the group seeded for help-desk agents
pub const AGENTS_GROUP: &str = "agents";

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

fn definition(resource: &str, action: &str, name: &str, app_label: &str, model: &str) -> PermissionDefinition {
    PermissionDefinition {
        codename: format_permission(resource, action),
        name: name.to_string(),
        app_label: app_label.to_string(),
        model: model.to_string(),
    }
}

lazy_static! {
    pub static ref PERMISSION_DEFINITIONS: Vec<PermissionDefinition> = vec![
        definition(Resources::SERVICE_ORDERS, Actions::READ, "Can view service order", "serviceorders", "serviceorder"),
        definition(Resources::SERVICE_ORDERS, Actions::CREATE, "Can add service order", "serviceorders", "serviceorder"),
        definition(Resources::SERVICE_ORDERS, Actions::UPDATE, "Can change service order", "serviceorders", "serviceorder"),
        definition(Resources::SERVICE_ORDERS, Actions::DELETE, "Can delete service order", "serviceorders", "serviceorder"),
        definition(Resources::SERVICE_ORDERS, Actions::MANAGE, "Can bulk manage service orders", "serviceorders", "serviceorder"),
        definition(Resources::USERS, Actions::READ, "Can view user", "auth", "user"),
        definition(Resources::USERS, Actions::MANAGE, "Can manage users", "auth", "user"),
        definition(Resources::PERMISSIONS, Actions::READ, "Can view permission", "auth", "permission"),
        definition(Resources::ASSISTANT, Actions::CHAT, "Can chat with the assistant", "aichat", "chat"),
    ];

    /// Codenames granted to the seeded agents group
    pub static ref AGENT_PERMISSIONS: Vec<&'static str> = vec![
        consts::SERVICE_ORDERS_READ,
        consts::SERVICE_ORDERS_CREATE,
        consts::SERVICE_ORDERS_UPDATE,
        consts::ASSISTANT_CHAT,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn definitions_cover_every_constant() {
        let codenames: HashSet<&str> = PERMISSION_DEFINITIONS
            .iter()
            .map(|d| d.codename.as_str())
            .collect();

        for code in [
            consts::SERVICE_ORDERS_READ,
            consts::SERVICE_ORDERS_CREATE,
            consts::SERVICE_ORDERS_UPDATE,
            consts::SERVICE_ORDERS_DELETE,
            consts::SERVICE_ORDERS_MANAGE,
            consts::USERS_READ,
            consts::USERS_MANAGE,
            consts::PERMISSIONS_READ,
            consts::ASSISTANT_CHAT,
        ] {
            assert!(codenames.contains(code), "missing definition for {code}");
        }
        assert_eq!(codenames.len(), PERMISSION_DEFINITIONS.len());
    }

    #[test]
    fn agent_permissions_are_defined() {
        for code in AGENT_PERMISSIONS.iter() {
            assert!(PERMISSION_DEFINITIONS.iter().any(|d| d.codename == *code));
        }
    }
}
