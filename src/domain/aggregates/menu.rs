//! Menu tree and visibility rules

use serde::Serialize;
use std::collections::HashMap;

use crate::domain::value_objects::Role;
use crate::models::MenuItem;

#[derive(Clone, Debug, Serialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub item: MenuItem,
    pub children: Vec<MenuNode>,
}

/// Whether a menu item with `required_role` is shown to `role`.
/// Admins see everything; an unset requirement means everyone.
pub fn visible_to(required_role: Option<&str>, role: Role) -> bool {
    match (role, required_role.map(str::trim)) {
        (Role::Admin, _) => true,
        (_, None) | (_, Some("")) | (_, Some("all")) => true,
        (role, Some(required)) => required.eq_ignore_ascii_case(role.as_str()),
    }
}

/// Nests items under their parents, preserving input order at each level.
/// Items whose parent is not in `items` are dropped.
pub fn build_tree(items: Vec<MenuItem>) -> Vec<MenuNode> {
    let mut by_parent: HashMap<Option<i64>, Vec<MenuItem>> = HashMap::new();
    for item in items { by_parent.entry(item.parent_id).or_default().push(item); }
    attach(None, &mut by_parent)
}

fn attach(parent: Option<i64>, by_parent: &mut HashMap<Option<i64>, Vec<MenuItem>>) -> Vec<MenuNode> {
    let Some(children) = by_parent.remove(&parent) else { return Vec::new() };
    children.into_iter().map(|item| {
        let nested = attach(Some(item.id), by_parent);
        MenuNode { item, children: nested }
    }).collect()
}

/// Whether re-parenting `menu_id` under `new_parent` would create a cycle,
/// given every `(id, parent_id)` pair currently stored.
pub fn creates_cycle(links: &[(i64, Option<i64>)], menu_id: i64, new_parent: i64) -> bool {
    let parents: HashMap<i64, Option<i64>> = links.iter().copied().collect();
    let mut cursor = Some(new_parent);
    let mut steps = 0;
    while let Some(id) = cursor {
        if id == menu_id { return true; }
        steps += 1;
        if steps > links.len() { return true; }
        cursor = parents.get(&id).copied().flatten();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: i64, parent_id: Option<i64>, name: &str) -> MenuItem {
        MenuItem {
            id, name: name.into(), icon: None, path: None, parent_id, sort_order: 0, is_visible: true,
            required_role: None, component: None, created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_visibility() {
        assert!(visible_to(Some("admin"), Role::Admin));
        assert!(!visible_to(Some("admin"), Role::Operator));
        assert!(visible_to(Some("all"), Role::Operator));
        assert!(visible_to(None, Role::Operator));
        assert!(visible_to(Some("operator"), Role::Operator));
    }

    #[test]
    fn test_build_tree() {
        let tree = build_tree(vec![item(1, None, "Dashboard"), item(2, None, "Settings"), item(3, Some(2), "Users"), item(4, Some(9), "Orphan")]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].item.name, "Users");
        let json = serde_json::to_value(&tree[0]).unwrap();
        assert_eq!(json["name"], "Dashboard");
        assert!(json["children"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_creates_cycle() {
        let links = vec![(1, None), (2, Some(1)), (3, Some(2))];
        assert!(creates_cycle(&links, 1, 3));
        assert!(creates_cycle(&links, 2, 2));
        assert!(!creates_cycle(&links, 3, 1));
    }
}
