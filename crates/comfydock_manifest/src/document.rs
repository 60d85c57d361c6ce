use std::fmt::{self, Display, Formatter};

use toml_edit::{Array, Item, Table, TableLike, Value};

use crate::TomlError;

/// A wrapper around a mutable TOML document.
///
/// All manifest handlers route their edits through this type so that the
/// formatting of untouched parts of the document survives a round-trip.
#[derive(Debug, Clone, Default)]
pub struct TomlDocument(toml_edit::DocumentMut);

impl Display for TomlDocument {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TomlDocument {
    pub fn new(document: toml_edit::DocumentMut) -> Self {
        Self(document)
    }

    pub fn as_table(&self) -> &Table {
        self.0.as_table()
    }

    pub fn as_table_mut(&mut self) -> &mut Table {
        self.0.as_table_mut()
    }

    /// Retrieve a reference to a target table given in dotted form
    /// (e.g. `tool.comfydock.nodes`) from the root of the document.
    pub fn get_nested_table<'a>(&'a self, table_name: &str) -> Result<&'a dyn TableLike, TomlError> {
        let mut current_table = self.0.as_table() as &dyn TableLike;

        for part in table_name.split('.') {
            current_table = current_table
                .get(part)
                .ok_or_else(|| TomlError::table_error(part, table_name))?
                .as_table_like()
                .ok_or_else(|| TomlError::table_error(part, table_name))?;
        }
        Ok(current_table)
    }

    /// Retrieve a mutable reference to a target table given in dotted form.
    /// Missing intermediate tables are inserted as implicit tables so that
    /// saving the document does not leave empty `[section]` headers behind.
    pub fn get_or_insert_nested_table<'a>(
        &'a mut self,
        table_name: &str,
    ) -> Result<&'a mut dyn TableLike, TomlError> {
        let mut current_table = self.0.as_table_mut() as &mut dyn TableLike;

        for part in table_name.split('.') {
            let entry = current_table.entry(part);
            let item = entry.or_insert(Item::Table(Table::new()));
            if let Some(table) = item.as_table_mut() {
                table.set_implicit(true);
            }
            current_table = item
                .as_table_like_mut()
                .ok_or_else(|| TomlError::table_error(part, table_name))?;
        }
        Ok(current_table)
    }

    /// Retrieve a mutable reference to the array `array_name` in the table
    /// `table_name`, inserting an empty array when absent.
    pub fn get_or_insert_toml_array_mut<'a>(
        &'a mut self,
        table_name: &str,
        array_name: &str,
    ) -> Result<&'a mut Array, TomlError> {
        self.get_or_insert_nested_table(table_name)?
            .entry(array_name)
            .or_insert(Item::Value(Value::Array(Array::new())))
            .as_array_mut()
            .ok_or_else(|| TomlError::array_error(array_name, table_name))
    }

    /// Retrieve a reference to the array `array_name` in `table_name`, or
    /// `None` when either is absent.
    pub fn get_toml_array<'a>(
        &'a self,
        table_name: &str,
        array_name: &str,
    ) -> Option<&'a Array> {
        self.get_nested_table(table_name)
            .ok()
            .and_then(|t| t.get(array_name))
            .and_then(|a| a.as_array())
    }

    /// Remove `key` from the table at `table_name`. Returns the removed item.
    pub fn remove_from_table(&mut self, table_name: &str, key: &str) -> Option<Item> {
        let mut current_table = self.0.as_table_mut() as &mut dyn TableLike;
        for part in table_name.split('.') {
            current_table = current_table.get_mut(part)?.as_table_like_mut()?;
        }
        current_table.remove(key)
    }

    /// Drop empty sub-tables bottom-up, starting from the table at
    /// `table_name`. The table itself is removed from its parent when it
    /// ends up empty.
    pub fn prune_empty_tables(&mut self, table_name: &str) {
        fn prune(table: &mut dyn TableLike) {
            let empty_keys: Vec<String> = table
                .iter_mut()
                .filter_map(|(key, item)| {
                    if let Some(child) = item.as_table_like_mut() {
                        prune(child);
                        if child.is_empty() {
                            return Some(key.get().to_string());
                        }
                    }
                    None
                })
                .collect();
            for key in empty_keys {
                table.remove(&key);
            }
        }

        let Some((parent_path, leaf)) = table_name.rsplit_once('.') else {
            if let Some(item) = self.0.as_table_mut().get_mut(table_name) {
                if let Some(table) = item.as_table_like_mut() {
                    prune(table);
                    if table.is_empty() {
                        self.0.as_table_mut().remove(table_name);
                    }
                }
            }
            return;
        };

        fn descend_and_prune(current_table: &mut dyn TableLike, parts: &[&str], leaf: &str) -> bool {
            if let Some(part) = parts.first() {
                match current_table
                    .get_mut(part)
                    .and_then(|item| item.as_table_like_mut())
                {
                    Some(table) => descend_and_prune(table, &parts[1..], leaf),
                    None => false,
                }
            } else {
                let mut removed_leaf = false;
                if let Some(item) = current_table.get_mut(leaf) {
                    if let Some(table) = item.as_table_like_mut() {
                        prune(table);
                        if table.is_empty() {
                            removed_leaf = true;
                        }
                    }
                }
                if removed_leaf {
                    current_table.remove(leaf);
                }
                removed_leaf
            }
        }

        let parts: Vec<&str> = parent_path.split('.').collect();
        let removed_leaf = descend_and_prune(self.0.as_table_mut(), &parts, leaf);

        // Walk the ancestors as well; removing the leaf may have emptied them.
        if removed_leaf {
            self.prune_empty_tables(parent_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use toml_edit::DocumentMut;

    use super::*;

    #[test]
    fn get_or_insert_nested_table_creates_missing_levels() {
        let mut doc = TomlDocument::new(DocumentMut::new());
        doc.get_or_insert_nested_table("tool.comfydock.nodes")
            .unwrap()
            .insert("my-node", toml_edit::value("1.0"));

        let table = doc.get_nested_table("tool.comfydock.nodes").unwrap();
        assert!(table.get("my-node").is_some());
    }

    #[test]
    fn get_or_insert_nested_table_reaches_into_inline_tables() {
        let toml = r#"
[envs.python]
dependencies = { dummy = "3.11.*" }
"#;
        let mut doc = TomlDocument::new(DocumentMut::from_str(toml).unwrap());
        doc.get_or_insert_nested_table("envs.python.dependencies")
            .unwrap()
            .insert("extra", toml_edit::value("6.6"));

        let deps = doc.get_nested_table("envs.python.dependencies").unwrap();
        assert!(deps.get("dummy").is_some());
        assert!(deps.get("extra").is_some());
    }

    #[test]
    fn intermediate_tables_stay_implicit() {
        let mut doc = TomlDocument::new(DocumentMut::new());
        doc.get_or_insert_nested_table("tool.comfydock").unwrap();
        assert!(!doc.to_string().contains("[tool]"));
    }

    #[test]
    fn prune_removes_empty_tables_bottom_up() {
        let toml = r#"
[tool.comfydock.models.required]

[tool.comfydock.models.optional]

[tool.comfydock.nodes.my-node]
name = "my-node"
"#;
        let mut doc = TomlDocument::new(DocumentMut::from_str(toml).unwrap());
        doc.prune_empty_tables("tool.comfydock");

        let rendered = doc.to_string();
        assert!(!rendered.contains("models"));
        assert!(rendered.contains("[tool.comfydock.nodes.my-node]"));
    }

    #[test]
    fn prune_removes_whole_namespace_when_empty() {
        let toml = r#"
[project]
name = "x"

[tool.comfydock.models.required]
"#;
        let mut doc = TomlDocument::new(DocumentMut::from_str(toml).unwrap());
        doc.prune_empty_tables("tool.comfydock");
        doc.prune_empty_tables("tool");

        let rendered = doc.to_string();
        assert!(!rendered.contains("comfydock"));
        assert!(!rendered.contains("[tool]"));
        assert!(rendered.contains("[project]"));
    }
}
