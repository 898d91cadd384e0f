use serde::{Deserialize, Serialize};

pub const TYPE_ROLE: &str = "role";
pub const TYPE_STATUS: &str = "status";
pub const MODULE_USERS: &str = "users";

/// One administrator-configurable classification entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceItem {
    /// Stable numeric identity; survives renames of `code`.
    pub id: i64,
    pub code: String,
    pub value: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    pub module: String,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub icon_name: Option<String>,
}

fn default_active() -> bool {
    true
}

impl ReferenceItem {
    /// Minimal active item; optional fields left empty.
    pub fn new(
        id: i64,
        item_type: &str,
        module: &str,
        code: &str,
        display_name: &str,
        sort_order: i32,
    ) -> Self {
        Self {
            id,
            code: code.to_string(),
            value: code.to_string(),
            display_name: display_name.to_string(),
            description: None,
            item_type: item_type.to_string(),
            module: module.to_string(),
            feature: None,
            is_active: true,
            sort_order,
            color_code: None,
            icon_name: None,
        }
    }

    pub fn with_render(mut self, color_code: &str, icon_name: &str) -> Self {
        self.color_code = Some(color_code.to_string());
        self.icon_name = Some(icon_name.to_string());
        self
    }
}

/// The role and status entries a fresh installation starts with.
pub fn default_items() -> Vec<ReferenceItem> {
    vec![
        ReferenceItem::new(1, TYPE_ROLE, MODULE_USERS, "admin", "Admin", 1)
            .with_render("bg-blue-100 text-blue-800", "Shield"),
        ReferenceItem::new(2, TYPE_ROLE, MODULE_USERS, "user", "User", 2)
            .with_render("bg-green-100 text-green-800", "User"),
        ReferenceItem::new(3, TYPE_ROLE, MODULE_USERS, "operator", "Operator", 3)
            .with_render("bg-purple-100 text-purple-800", "UserCog"),
        ReferenceItem::new(4, TYPE_ROLE, MODULE_USERS, "viewer", "Viewer", 4)
            .with_render("bg-gray-100 text-gray-800", "CircleUser"),
        ReferenceItem::new(5, TYPE_STATUS, MODULE_USERS, "active", "Active", 1)
            .with_render("bg-green-100 text-green-800", "CheckCircle"),
        ReferenceItem::new(6, TYPE_STATUS, MODULE_USERS, "inactive", "Inactive", 2)
            .with_render("bg-gray-100 text-gray-800", "XCircle"),
        ReferenceItem::new(7, TYPE_STATUS, MODULE_USERS, "suspended", "Suspended", 3)
            .with_render("bg-amber-100 text-amber-800", "UserCheck"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_shape_with_defaults() {
        let json = r#"{"id":7,"code":"admin","value":"admin","display_name":"Admin","type":"role","module":"users"}"#;
        let item: ReferenceItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_type, "role");
        assert!(item.is_active);
        assert_eq!(item.sort_order, 0);
        assert!(item.icon_name.is_none());
    }

    #[test]
    fn default_ids_are_unique() {
        let items = default_items();
        let mut ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), items.len());
    }
}
