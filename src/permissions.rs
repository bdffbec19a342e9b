//! Role and permission checks for admin routes.
//!
//! Permission strings look like `products:create`. An admin holding
//! `products:*` may do anything to products; `*` grants everything.

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_ADMIN: &str = "super_admin";

pub const ROLES: [&str; 3] = [ROLE_USER, ROLE_ADMIN, ROLE_SUPER_ADMIN];

pub fn has_permission(role: &str, permissions: &[String], resource: &str, action: &str) -> bool {
    match role {
        ROLE_SUPER_ADMIN => true,
        ROLE_ADMIN => permissions.iter().any(|granted| grants(granted, resource, action)),
        _ => false,
    }
}

fn grants(granted: &str, resource: &str, action: &str) -> bool {
    if granted == "*" {
        return true;
    }
    match granted.split_once(':') {
        Some((res, act)) => res == resource && (act == "*" || act == action),
        None => false,
    }
}

pub fn is_valid_role(role: &str) -> bool {
    ROLES.contains(&role)
}

/// Permission strings must be `*` or `resource:action` with non-empty halves.
pub fn is_valid_permission(permission: &str) -> bool {
    if permission == "*" {
        return true;
    }
    matches!(
        permission.split_once(':'),
        Some((res, act)) if !res.is_empty() && !act.is_empty() && !act.contains(':')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn super_admin_can_do_anything() {
        assert!(has_permission(ROLE_SUPER_ADMIN, &[], "orders", "update"));
    }

    #[test]
    fn users_never_have_admin_permissions() {
        assert!(!has_permission(ROLE_USER, &perms(&["*"]), "orders", "read"));
    }

    #[test]
    fn admin_needs_matching_grant() {
        let granted = perms(&["products:create", "orders:*"]);
        assert!(has_permission(ROLE_ADMIN, &granted, "products", "create"));
        assert!(!has_permission(ROLE_ADMIN, &granted, "products", "delete"));
        assert!(has_permission(ROLE_ADMIN, &granted, "orders", "delete"));
        assert!(!has_permission(ROLE_ADMIN, &granted, "blog", "read"));
        assert!(has_permission(ROLE_ADMIN, &perms(&["*"]), "blog", "read"));
    }

    #[test]
    fn permission_format() {
        assert!(is_valid_permission("*"));
        assert!(is_valid_permission("reviews:update"));
        assert!(!is_valid_permission("reviews"));
        assert!(!is_valid_permission(":update"));
        assert!(!is_valid_permission("a:b:c"));
    }
}
